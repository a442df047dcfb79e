use crate::runtime::{NativeEnv, NativeResult, Vm};

const FLOAT: &str = "java/lang/Float";

pub(super) fn register_natives(vm: &Vm) {
    vm.register_native(FLOAT, "floatToRawIntBits", "(F)I", float_to_raw_int_bits);
    vm.register_native(FLOAT, "intBitsToFloat", "(I)F", int_bits_to_float);
}

// public static native int floatToRawIntBits(float value);
fn float_to_raw_int_bits(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let value = env.args().get_float(0);
    env.stack().push_int(value.to_bits() as i32);
    Ok(())
}

// public static native float intBitsToFloat(int bits);
fn int_bits_to_float(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let bits = env.args().get_int(0);
    env.stack().push_float(f32::from_bits(bits as u32));
    Ok(())
}
