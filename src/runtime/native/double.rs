use crate::runtime::{NativeEnv, NativeResult, Vm};

const DOUBLE: &str = "java/lang/Double";

pub(super) fn register_natives(vm: &Vm) {
    vm.register_native(DOUBLE, "doubleToRawLongBits", "(D)J", double_to_raw_long_bits);
    vm.register_native(DOUBLE, "longBitsToDouble", "(J)D", long_bits_to_double);
}

// public static native long doubleToRawLongBits(double value);
fn double_to_raw_long_bits(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let value = env.args().get_double(0);
    env.stack().push_long(value.to_bits() as i64);
    Ok(())
}

// public static native double longBitsToDouble(long bits);
fn long_bits_to_double(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let bits = env.args().get_long(0);
    env.stack().push_double(f64::from_bits(bits as u64));
    Ok(())
}
