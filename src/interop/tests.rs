//! Test suite for the interop module
//!
//! Invocations that reach the engine are serialized through `CALL_LOCK`
//! because the last-error cell is process-wide.

use super::*;
use crate::errors::{FiddleError, TypePosition};
use core::ffi::c_void;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static CALL_LOCK: Mutex<()> = Mutex::new(());

fn call<E: CallEngine>(f: &Function<E>, args: &[Value]) -> crate::Result<Value> {
    let _guard = CALL_LOCK.lock();
    unsafe { f.invoke(args) }
}

// Native test targets
extern "C" fn add_i32(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

extern "C" fn mul_f64(a: f64, b: f64) -> f64 {
    a * b
}

extern "C" fn half_f32(x: f32) -> f32 {
    x / 2.0
}

extern "C" fn negate_i8(x: i8) -> i8 {
    x.wrapping_neg()
}

extern "C" fn max_u64() -> u64 {
    u64::MAX
}

extern "C" fn identity_ptr(ptr: *const c_void) -> *const c_void {
    ptr
}

extern "C" fn no_args() -> i32 {
    42
}

static SIDE_EFFECTS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn bump() {
    SIDE_EFFECTS.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn mixed(a: i8, b: f64, c: u16, d: i64, e: f32) -> f64 {
    a as f64 + b + c as f64 + d as f64 + e as f64
}

#[allow(clippy::too_many_arguments)]
extern "C" fn sum10(
    a: i64, b: i64, c: i64, d: i64, e: i64,
    f: i64, g: i64, h: i64, i: i64, j: i64,
) -> i64 {
    a + b + c + d + e + f + g + h + i + j
}

#[cfg(not(windows))]
extern "C" fn fail_with(code: i32) -> i32 {
    errno::set_errno(errno::Errno(code));
    -1
}

extern "C" fn invert(flag: bool) -> bool {
    !flag
}

/// Engine stub that counts calls and echoes the first argument
#[derive(Clone, Default)]
struct CountingEngine {
    prepared: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    reject_with: Option<u32>,
}

impl CountingEngine {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CallEngine for CountingEngine {
    type Prepared = Vec<TypeTag>;

    fn prepare(&self, args: &[&TypeDesc], _ret: &TypeDesc, _abi: Abi) -> Result<Vec<TypeTag>, u32> {
        if let Some(status) = self.reject_with {
            return Err(status);
        }
        self.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(args.iter().map(|desc| desc.tag).collect())
    }

    unsafe fn call(
        &self,
        prepared: &Vec<TypeTag>,
        _address: usize,
        ret: *mut NativeSlot,
        args: *mut *mut c_void,
    ) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!((*args.add(prepared.len())).is_null(), "missing sentinel");
        if !prepared.is_empty() {
            *ret = *(*args as *const NativeSlot);
        }
    }
}

fn stub(args: &[TypeCode], ret: TypeCode) -> (Function<CountingEngine>, CountingEngine) {
    let engine = CountingEngine::default();
    let f = FunctionBuilder::new(0x1000usize)
        .args(args.iter().copied())
        .returns(ret)
        .trust_policy(TrustPolicy::Permissive)
        .build_with(engine.clone())
        .expect("stub function");
    (f, engine)
}

// ===== Type registry =====

#[test]
fn test_type_sizes() {
    assert_eq!(TypeTag::I8.size(), 1);
    assert_eq!(TypeTag::I16.size(), 2);
    assert_eq!(TypeTag::I32.size(), 4);
    assert_eq!(TypeTag::I64.size(), 8);
    assert_eq!(TypeTag::F32.size(), 4);
    assert_eq!(TypeTag::F64.size(), 8);
    assert_eq!(TypeTag::Pointer.size(), core::mem::size_of::<*mut c_void>());
}

#[test]
fn test_native_slot_covers_every_classification() {
    for tag in TypeTag::ALL {
        let desc = TypeRegistry::canonical(tag);
        assert!(desc.size <= core::mem::size_of::<NativeSlot>(), "{} too large", tag);
        assert!(desc.align <= core::mem::align_of::<NativeSlot>(), "{} overaligned", tag);
    }
}

#[test]
fn test_type_checks() {
    assert!(TypeTag::I32.is_integral());
    assert!(TypeTag::U64.is_integral());
    assert!(TypeTag::F64.is_float());
    assert!(!TypeTag::Void.is_integral());
    assert!(!TypeTag::Pointer.is_float());
    assert_eq!(host_type_name(TypeTag::F32), "float");
    assert_eq!(host_type_name(TypeTag::Void), "nil");
}

// ===== Marshaling =====

#[test]
fn test_pointer_tag_conversions() {
    let slot = to_native(TypeTag::Pointer, &Value::Nil).unwrap();
    assert_eq!(slot.address(), 0);

    let ptr = Pointer::new(0xdead_0000);
    let slot = to_native(TypeTag::Pointer, &Value::Pointer(ptr)).unwrap();
    assert_eq!(slot.address(), 0xdead_0000);

    let slot = to_native(TypeTag::Pointer, &Value::Int(0x40)).unwrap();
    assert_eq!(slot.address(), 0x40);

    match from_native(TypeTag::Pointer, &slot) {
        Value::Pointer(p) => {
            assert_eq!(p.addr(), 0x40);
            assert_eq!(p.size(), 0);
            assert!(!p.is_owned());
        }
        other => panic!("expected pointer, got {:?}", other),
    }
}

#[test]
fn test_integer_truncation_uses_bit_patterns() {
    let slot = to_native(TypeTag::I8, &Value::Int(300)).unwrap();
    assert_eq!(from_native(TypeTag::I8, &slot), Value::Int(44));

    let slot = to_native(TypeTag::U8, &Value::Int(-1)).unwrap();
    assert_eq!(from_native(TypeTag::U8, &slot), Value::Int(255));

    let slot = to_native(TypeTag::I32, &Value::UInt(u64::MAX)).unwrap();
    assert_eq!(from_native(TypeTag::I32, &slot), Value::Int(-1));

    let slot = to_native(TypeTag::I64, &Value::Float(-2.9)).unwrap();
    assert_eq!(from_native(TypeTag::I64, &slot), Value::Int(-2));
}

#[test]
fn test_no_promotion_across_classification() {
    let cases = [
        (TypeTag::F64, Value::from("1.5"), "string"),
        (TypeTag::F32, Value::Bool(true), "bool"),
        (TypeTag::F64, Value::Nil, "nil"),
        (TypeTag::I32, Value::from("12"), "string"),
        (TypeTag::I32, Value::Bool(false), "bool"),
        (TypeTag::U16, Value::Float(f64::NAN), "float"),
        (TypeTag::Pointer, Value::Bool(true), "bool"),
        (TypeTag::Void, Value::Int(1), "integer"),
    ];

    for (tag, value, kind) in cases {
        match to_native(tag, &value) {
            Err(FiddleError::Type { index: None, expected, found }) => {
                assert_eq!(expected, tag);
                assert_eq!(found, kind);
            }
            other => panic!("{} <- {:?} should fail, got {:?}", tag, value, other),
        }
    }
}

#[test]
fn test_void_return_is_nil() {
    assert_eq!(from_native(TypeTag::Void, &NativeSlot::zeroed()), Value::Nil);
}

#[test]
fn test_bool_slots_keep_bool_identity() {
    for (value, expected) in [
        (Value::Bool(true), true),
        (Value::Bool(false), false),
        (Value::Int(7), true),
        (Value::Int(0), false),
        (Value::Bool(true).taint(), true),
    ] {
        let slot = to_native(TypeTag::Bool, &value).unwrap();
        assert_eq!(unsafe { slot.u8 }, expected as u8);
        assert_eq!(from_native(TypeTag::Bool, &slot), Value::Bool(expected));
    }

    assert!(matches!(
        to_native(TypeTag::Bool, &Value::from("yes")),
        Err(FiddleError::Type { expected: TypeTag::Bool, found: "string", .. })
    ));
    assert_eq!(describe(code::BOOL).unwrap().tag, TypeTag::Bool);
}

#[test]
fn test_marshal_args_reports_index() {
    let tags = [TypeTag::I32, TypeTag::F64];
    let args = [Value::Int(1), Value::from("x")];
    let mut out = [NativeSlot::zeroed(); 2];
    assert_eq!(
        marshal_args(&tags, &args, &mut out),
        Err(FiddleError::Type { index: Some(1), expected: TypeTag::F64, found: "string" })
    );
}

proptest! {
    #[test]
    fn prop_signed_round_trip(v in any::<i64>()) {
        for (tag, expected) in [
            (TypeTag::I8, v as i8 as i64),
            (TypeTag::I16, v as i16 as i64),
            (TypeTag::I32, v as i32 as i64),
            (TypeTag::I64, v),
        ] {
            let slot = to_native(tag, &Value::Int(expected)).unwrap();
            prop_assert_eq!(from_native(tag, &slot), Value::Int(expected));
        }
    }

    #[test]
    fn prop_unsigned_round_trip(v in any::<u64>()) {
        for (tag, expected) in [
            (TypeTag::U8, Value::from(v as u8 as u64)),
            (TypeTag::U16, Value::from(v as u16 as u64)),
            (TypeTag::U32, Value::from(v as u32 as u64)),
            (TypeTag::U64, Value::from(v)),
        ] {
            let slot = to_native(tag, &expected).unwrap();
            prop_assert_eq!(from_native(tag, &slot), expected);
        }
    }

    #[test]
    fn prop_float_round_trip(
        single in any::<f32>().prop_filter("finite", |v| v.is_finite()),
        double in any::<f64>().prop_filter("finite", |v| v.is_finite()),
    ) {
        let value = Value::Float(single as f64);
        let slot = to_native(TypeTag::F32, &value).unwrap();
        prop_assert_eq!(from_native(TypeTag::F32, &slot), value);

        let value = Value::Float(double);
        let slot = to_native(TypeTag::F64, &value).unwrap();
        prop_assert_eq!(from_native(TypeTag::F64, &slot), value);
    }

    #[test]
    fn prop_pointer_round_trip_keeps_address_only(addr in any::<usize>(), size in 0usize..4096) {
        let value = Value::Pointer(Pointer::with_size(addr, size));
        let slot = to_native(TypeTag::Pointer, &value).unwrap();
        match from_native(TypeTag::Pointer, &slot) {
            Value::Pointer(p) => {
                prop_assert_eq!(p.addr(), addr);
                prop_assert_eq!(p.size(), 0);
                prop_assert!(!p.is_owned());
            }
            other => prop_assert!(false, "expected pointer, got {:?}", other),
        }
    }

    #[test]
    fn prop_counts_at_or_above_bound_overflow(len in MAX_ARGS..=usize::MAX) {
        let overflowed = matches!(
            check_max_args("number of arguments", len),
            Err(FiddleError::Overflow { .. })
        );
        prop_assert!(overflowed);
        prop_assert!(frame_size(len).is_err());
    }

    #[test]
    fn prop_add_wraps_like_native_code(a in any::<i32>(), b in any::<i32>()) {
        let f = Function::new(add_i32 as usize, [code::INT, code::INT], code::INT).unwrap();
        prop_assert_eq!(
            call(&f, &[a.into(), b.into()]).unwrap(),
            Value::Int(a.wrapping_add(b) as i64)
        );
    }
}

// ===== Descriptor compilation =====

#[test]
fn test_overflow_detected_before_collecting_arguments() {
    let engine = CountingEngine::default();
    let result = CallDescriptor::compile(
        &engine,
        (0..MAX_ARGS).map(|_| code::INT),
        code::VOID,
        Abi::DEFAULT,
    );
    assert!(matches!(
        result,
        Err(FiddleError::Overflow { len, max, .. }) if len == MAX_ARGS && max == MAX_ARGS
    ));
    assert_eq!(engine.prepared.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unknown_type_code_produces_no_function() {
    let engine = CountingEngine::default();
    let result = FunctionBuilder::new(0x1000usize)
        .args([code::INT, TypeCode(99), code::DOUBLE])
        .build_with(engine.clone());

    assert_eq!(
        result.err(),
        Some(FiddleError::UnsupportedType {
            code: 99,
            position: Some(TypePosition::Argument(1)),
        })
    );
    assert_eq!(engine.prepared.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unknown_return_code_is_rejected() {
    let result = Function::new(no_args as usize, [code::INT], TypeCode(-8));
    assert!(matches!(
        result,
        Err(FiddleError::UnsupportedType { code: -8, position: Some(TypePosition::Return) })
    ));
}

#[test]
fn test_void_arguments_are_rejected() {
    let result = Function::new(no_args as usize, [code::VOID], code::INT);
    assert!(matches!(
        result,
        Err(FiddleError::UnsupportedType { code: 0, position: Some(TypePosition::Argument(0)) })
    ));
}

#[test]
fn test_engine_rejection_carries_status() {
    let engine = CountingEngine { reject_with: Some(2), ..Default::default() };
    let abi = Abi::from_raw(0xfff);
    let result = FunctionBuilder::new(0x1000usize).abi(abi).build_with(engine);
    assert_eq!(result.err(), Some(FiddleError::Prepare { status: 2, abi }));
}

#[test]
fn test_libffi_rejects_unknown_abi() {
    let result = FunctionBuilder::new(no_args as usize)
        .returns(code::INT)
        .abi(Abi::from_raw(0xffff))
        .build();
    match result {
        Err(FiddleError::Prepare { status, .. }) => assert_ne!(status, 0),
        other => panic!("expected prepare error, got {:?}", other),
    }
}

#[test]
fn test_null_address_is_rejected() {
    assert_eq!(
        Function::new(0usize, [code::INT], code::INT).err(),
        Some(FiddleError::NullAddress)
    );
}

#[test]
fn test_libffi_cif_keeps_sentinel() {
    let f = Function::new(add_i32 as usize, [code::INT, code::INT], code::INT).unwrap();
    let cif = f.descriptor().prepared();
    assert_eq!(cif.arg_count(), 2);
    assert_eq!(cif.arg_types().len(), 3);
    assert!(cif.arg_types()[2].is_null());
}

// ===== Invocation protocol (stub engine) =====

#[test]
fn test_wrong_argument_count_never_calls_native_code() {
    let (f, engine) = stub(&[code::INT, code::INT], code::INT);

    for args in [vec![], vec![Value::Int(1)], vec![Value::Int(1), Value::Int(2), Value::Int(3)]] {
        let given = args.len();
        assert_eq!(
            call(&f, &args),
            Err(FiddleError::ArgumentCount { expected: 2, given })
        );
    }
    assert_eq!(engine.calls(), 0);
}

#[test]
fn test_marshal_failure_never_calls_native_code() {
    let (f, engine) = stub(&[code::INT, code::DOUBLE], code::INT);
    let before = stats().marshaling_errors;

    assert_eq!(
        call(&f, &[Value::Int(1), Value::from("nope")]),
        Err(FiddleError::Type { index: Some(1), expected: TypeTag::F64, found: "string" })
    );
    assert_eq!(engine.calls(), 0);
    assert!(stats().marshaling_errors > before);
}

#[test]
fn test_tainted_arguments_follow_trust_policy() {
    let engine = CountingEngine::default();
    let strict = FunctionBuilder::new(0x1000usize)
        .args([code::INT, code::INT])
        .returns(code::INT)
        .trust_policy(TrustPolicy::RejectTainted)
        .build_with(engine.clone())
        .unwrap();

    let args = [Value::Int(1), Value::Int(2).taint()];
    assert_eq!(call(&strict, &args), Err(FiddleError::Security { index: 1 }));
    assert_eq!(engine.calls(), 0);

    let (lenient, engine) = stub(&[code::INT, code::INT], code::INT);
    assert_eq!(call(&lenient, &args), Ok(Value::Int(1)));
    assert_eq!(engine.calls(), 1);
}

#[test]
fn test_trust_policy_defaults_to_global_config() {
    let config = crate::Config::default();
    assert_eq!(TrustPolicy::from(&config.security), TrustPolicy::Permissive);

    let mut strict = crate::Config::default();
    strict.security.reject_tainted = true;
    assert_eq!(TrustPolicy::from(&strict.security), TrustPolicy::RejectTainted);
}

#[test]
fn test_stub_sees_marshaled_slots() {
    let (f, engine) = stub(&[code::INT], code::INT);
    assert_eq!(call(&f, &[Value::Int(7)]), Ok(Value::Int(7)));
    assert_eq!(call(&f, &[Value::Int(-7)]), Ok(Value::Int(-7)));
    assert_eq!(engine.calls(), 2);
}

#[test]
fn test_invocation_leaves_signature_untouched() {
    let (f, _) = stub(&[code::LONG_LONG, code::VOIDP], code::LONG_LONG);
    let before = f.signature().clone();
    for _ in 0..3 {
        call(&f, &[Value::Int(5), Value::Nil]).unwrap();
    }
    assert_eq!(f.signature(), &before);
    assert_eq!(f.arg_types(), &[TypeTag::I64, TypeTag::Pointer]);
}

// ===== Invocation protocol (libffi) =====

#[test]
fn test_ffi_call_no_args() {
    let f = Function::new(no_args as usize, Vec::<TypeCode>::new(), code::INT).unwrap();
    assert_eq!(call(&f, &[]).unwrap(), Value::Int(42));
}

#[test]
fn test_ffi_call_add_and_wraparound() {
    let f = FunctionBuilder::new(add_i32 as usize)
        .args([code::INT, code::INT])
        .returns(code::INT)
        .name("add")
        .build()
        .unwrap();

    assert_eq!(call(&f, &[2.into(), 3.into()]).unwrap(), Value::Int(5));
    assert_eq!(
        call(&f, &[i32::MAX.into(), 1.into()]).unwrap(),
        Value::Int(i32::MIN as i64)
    );
    assert_eq!(f.name(), Some("add"));
}

#[test]
fn test_ffi_call_floats() {
    let f = Function::new(mul_f64 as usize, [code::DOUBLE, code::DOUBLE], code::DOUBLE).unwrap();
    assert_eq!(call(&f, &[1.5.into(), 4.into()]).unwrap(), Value::Float(6.0));

    let f = Function::new(half_f32 as usize, [code::FLOAT], code::FLOAT).unwrap();
    assert_eq!(call(&f, &[Value::Float(5.0)]).unwrap(), Value::Float(2.5));
}

#[test]
fn test_ffi_call_narrow_and_wide_returns() {
    let f = Function::new(negate_i8 as usize, [code::CHAR], code::CHAR).unwrap();
    assert_eq!(call(&f, &[5.into()]).unwrap(), Value::Int(-5));
    assert_eq!(call(&f, &[Value::Int(-128)]).unwrap(), Value::Int(-128));

    let f = Function::new(max_u64 as usize, Vec::<TypeCode>::new(), code::UINT64_T).unwrap();
    assert_eq!(call(&f, &[]).unwrap(), Value::UInt(u64::MAX));
}

#[test]
fn test_ffi_call_pointer_identity() {
    let f = Function::new(identity_ptr as usize, [code::VOIDP], code::VOIDP).unwrap();

    let buf = Pointer::malloc(16).unwrap();
    match call(&f, &[buf.clone().into()]).unwrap() {
        Value::Pointer(p) => {
            assert_eq!(p.addr(), buf.addr());
            assert_eq!(p.size(), 0);
            assert!(!p.is_owned());
        }
        other => panic!("expected pointer, got {:?}", other),
    }

    let null = call(&f, &[Value::Nil]).unwrap();
    assert!(null.as_pointer().unwrap().is_null());
}

#[test]
fn test_ffi_call_bool_round_trip() {
    let f = Function::new(invert as usize, [code::BOOL], code::BOOL).unwrap();
    assert_eq!(call(&f, &[Value::Bool(true)]).unwrap(), Value::Bool(false));
    assert_eq!(call(&f, &[Value::Bool(false)]).unwrap(), Value::Bool(true));
    assert_eq!(call(&f, &[Value::Int(0)]).unwrap(), Value::Bool(true));
}

#[test]
fn test_ffi_call_void_return() {
    let f = Function::new(bump as usize, Vec::<TypeCode>::new(), code::VOID).unwrap();
    let before = SIDE_EFFECTS.load(Ordering::SeqCst);
    assert_eq!(call(&f, &[]).unwrap(), Value::Nil);
    assert_eq!(SIDE_EFFECTS.load(Ordering::SeqCst), before + 1);
}

#[test]
fn test_ffi_call_mixed_classifications() {
    let f = Function::new(
        mixed as usize,
        [code::CHAR, code::DOUBLE, code::USHORT, code::LONG_LONG, code::FLOAT],
        code::DOUBLE,
    )
    .unwrap();

    let args = [
        Value::Int(-1),
        Value::Float(0.5),
        Value::Int(2),
        Value::Int(1 << 40),
        Value::Float(0.25),
    ];
    assert_eq!(
        call(&f, &args).unwrap(),
        Value::Float(-1.0 + 0.5 + 2.0 + (1u64 << 40) as f64 + 0.25)
    );
}

#[test]
fn test_ffi_call_stack_arguments() {
    let f = Function::new(sum10 as usize, [code::INT64_T; 10], code::INT64_T).unwrap();
    let args: Vec<Value> = (1..=10i64).map(Value::from).collect();
    assert_eq!(call(&f, &args).unwrap(), Value::Int(55));
}

#[cfg(not(windows))]
#[test]
fn test_errno_is_captured_after_each_call() {
    let f = Function::new(fail_with as usize, [code::INT], code::INT).unwrap();

    let _guard = CALL_LOCK.lock();
    last_error::set(0);
    assert_eq!(unsafe { f.invoke(&[libc::ENOENT.into()]) }.unwrap(), Value::Int(-1));
    assert_eq!(last_error::get(), libc::ENOENT);

    assert_eq!(unsafe { f.invoke(&[libc::EINVAL.into()]) }.unwrap(), Value::Int(-1));
    assert_eq!(last_error::get(), libc::EINVAL);
}

#[test]
fn test_stats_count_calls_and_descriptors() {
    let before = stats();
    let f = Function::new(no_args as usize, Vec::<TypeCode>::new(), code::INT).unwrap();
    call(&f, &[]).unwrap();
    let after = stats();
    assert!(after.calls_made > before.calls_made);
    assert!(after.descriptors_prepared > before.descriptors_prepared);
}

#[test]
fn test_function_debug_names_signature() {
    let f = FunctionBuilder::new(add_i32 as usize)
        .args([code::INT, code::INT])
        .returns(code::INT)
        .name("add")
        .build()
        .unwrap();
    let rendered = format!("{:?}", f);
    assert!(rendered.contains("\"add\""));
    assert!(rendered.contains("I32"));
    assert_eq!(f.signature().to_string(), "(int32, int32) -> int32");
    assert!(f.abi().is_default());
}
