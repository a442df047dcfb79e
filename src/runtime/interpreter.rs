mod exception;
mod frame;
pub mod instructions;

use std::{cmp::Ordering, ptr, sync::Arc};

pub(crate) use exception::capture_stack_trace;
pub use frame::*;

use crate::{
    descriptor::array_class_name,
    runtime::{
        ArrayData, ArrayType, Class, ClassMember, Constant, Exception, Field, Method, NativeEnv,
        NativeResult, Object, Reference, Slot, Vm,
        class_loader::initialize_class,
        famous_classes::{
            ABSTRACT_METHOD_ERROR, ARITHMETIC_EXCEPTION, ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
            ARRAY_STORE_EXCEPTION, CLASS_CAST_EXCEPTION, CLASS_FORMAT_ERROR, ILLEGAL_ACCESS_ERROR,
            INCOMPATIBLE_CLASS_CHANGE_ERROR, INSTANTIATION_ERROR, NEGATIVE_ARRAY_SIZE_EXCEPTION,
            NO_SUCH_METHOD_ERROR, NULL_POINTER_EXCEPTION,
        },
    },
};
use instructions as inst;

/// Runs the thread until it is no deeper than `stop_depth`. Exceptions are dispatched to
/// handlers in the frames above `stop_depth`; one that finds none is returned.
pub(crate) fn execute(vm: &Vm, thread: &mut Thread, stop_depth: usize) -> NativeResult<()> {
    while thread.depth() > stop_depth {
        if let Err(err) = run_top_frame(vm, thread) {
            exception::handle_exception(vm, thread, stop_depth, err)?;
        }
    }
    Ok(())
}

/// Runs the top frame until it calls, returns, or needs a class initialized, then applies
/// that to the thread.
fn run_top_frame(vm: &Vm, thread: &mut Thread) -> NativeResult<()> {
    let Some(frame) = thread.top_frame_mut() else {
        return Ok(());
    };
    let next = InterpreterEnv::new(vm, frame).run()?;
    match next {
        Next::Continue => {}
        Next::Invoke(method) => thread.invoke_method(method)?,
        Next::Initialize(class) => initialize_class(thread, &class)?,
        Next::InvokeNative => {
            let Some(method) = thread.top_frame().map(|frame| Arc::clone(&frame.method)) else {
                return Ok(());
            };
            let native = vm.natives().lookup(&method)?;
            native(&mut NativeEnv::new(vm, thread))?;
        }
        Next::Return { v1, v2 } => {
            if let Some(frame) = thread.pop_frame() {
                log::debug!(
                    "return from {}.{}{}",
                    frame.method.class().class_name,
                    frame.method.name,
                    frame.method.descriptor
                );
            }
            if let Some(caller) = thread.top_frame_mut() {
                for slot in [v1, v2].into_iter().flatten() {
                    caller.operand_stack.push_slot(slot);
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
enum Next {
    Continue,
    Invoke(Arc<Method>),
    /// the current instruction was rewound and runs again once `<clinit>` is done
    Initialize(Arc<Class>),
    InvokeNative,
    Return {
        v1: Option<Slot>,
        v2: Option<Slot>,
    },
}

struct InterpreterEnv<'a> {
    vm: &'a Vm,
    frame: &'a mut Frame,
    code: Arc<[u8]>,
    class: Arc<Class>,
}

impl<'a> InterpreterEnv<'a> {
    fn new(vm: &'a Vm, frame: &'a mut Frame) -> Self {
        let code = Arc::clone(&frame.method.code);
        let class = frame.method.class();
        Self {
            vm,
            frame,
            code,
            class,
        }
    }

    fn run(&mut self) -> NativeResult<Next> {
        loop {
            match self.step()? {
                Next::Continue => {}
                next => return Ok(next),
            }
        }
    }

    fn step(&mut self) -> NativeResult<Next> {
        let pc = self.frame.next_pc;
        self.frame.pc = pc;
        if pc >= self.code.len() {
            return Err(Exception::unsupported(format!(
                "execution fell off the end of {}",
                describe(&self.frame.method)
            )));
        }
        let op = self.read_u8();
        if self.vm.options().verbose_inst {
            log::trace!(
                "{}.{}{} pc={pc} op=0x{op:02x}",
                self.class.class_name,
                self.frame.method.name,
                self.frame.method.descriptor
            );
        }

        match op {
            inst::NOP => {}

            // const
            inst::ACONST_NULL => self.stack().push_reference(None),
            inst::ICONST_M1..=inst::ICONST_5 => {
                self.stack().push_int(op as i32 - inst::ICONST_0 as i32);
            }
            inst::LCONST_0 | inst::LCONST_1 => {
                self.stack().push_long((op - inst::LCONST_0) as i64);
            }
            inst::FCONST_0..=inst::FCONST_2 => {
                self.stack().push_float((op - inst::FCONST_0) as f32);
            }
            inst::DCONST_0 | inst::DCONST_1 => {
                self.stack().push_double((op - inst::DCONST_0) as f64);
            }
            inst::BIPUSH => {
                let byte = self.read_i8();
                self.stack().push_int(byte as i32);
            }
            inst::SIPUSH => {
                let short = self.read_i16();
                self.stack().push_int(short as i32);
            }
            inst::LDC => {
                let index = self.read_u8() as u16;
                self.ldc(index)?;
            }
            inst::LDC_W => {
                let index = self.read_u16();
                self.ldc(index)?;
            }
            inst::LDC2_W => {
                let index = self.read_u16();
                self.ldc2(index)?;
            }

            // load
            inst::ILOAD | inst::FLOAD | inst::ALOAD => {
                let index = self.read_u8() as usize;
                self.load(index);
            }
            inst::LLOAD | inst::DLOAD => {
                let index = self.read_u8() as usize;
                self.load_long(index);
            }
            inst::ILOAD_0..=inst::ILOAD_3 => self.load((op - inst::ILOAD_0) as usize),
            inst::LLOAD_0..=inst::LLOAD_3 => self.load_long((op - inst::LLOAD_0) as usize),
            inst::FLOAD_0..=inst::FLOAD_3 => self.load((op - inst::FLOAD_0) as usize),
            inst::DLOAD_0..=inst::DLOAD_3 => self.load_long((op - inst::DLOAD_0) as usize),
            inst::ALOAD_0..=inst::ALOAD_3 => self.load((op - inst::ALOAD_0) as usize),
            inst::IALOAD => {
                let value = self.array_load::<i32>()?;
                self.stack().push_int(value);
            }
            inst::LALOAD => {
                let value = self.array_load::<i64>()?;
                self.stack().push_long(value);
            }
            inst::FALOAD => {
                let value = self.array_load::<f32>()?;
                self.stack().push_float(value);
            }
            inst::DALOAD => {
                let value = self.array_load::<f64>()?;
                self.stack().push_double(value);
            }
            inst::AALOAD => {
                let value = self.array_load::<Option<Reference>>()?;
                self.stack().push_reference(value);
            }
            inst::BALOAD => {
                let value = self.array_load::<i8>()?;
                self.stack().push_int(value as i32);
            }
            inst::CALOAD => {
                let value = self.array_load::<u16>()?;
                self.stack().push_int(value as i32);
            }
            inst::SALOAD => {
                let value = self.array_load::<i16>()?;
                self.stack().push_int(value as i32);
            }

            // store
            inst::ISTORE | inst::FSTORE | inst::ASTORE => {
                let index = self.read_u8() as usize;
                self.store(index);
            }
            inst::LSTORE | inst::DSTORE => {
                let index = self.read_u8() as usize;
                self.store_long(index);
            }
            inst::ISTORE_0..=inst::ISTORE_3 => self.store((op - inst::ISTORE_0) as usize),
            inst::LSTORE_0..=inst::LSTORE_3 => self.store_long((op - inst::LSTORE_0) as usize),
            inst::FSTORE_0..=inst::FSTORE_3 => self.store((op - inst::FSTORE_0) as usize),
            inst::DSTORE_0..=inst::DSTORE_3 => self.store_long((op - inst::DSTORE_0) as usize),
            inst::ASTORE_0..=inst::ASTORE_3 => self.store((op - inst::ASTORE_0) as usize),
            inst::IASTORE => {
                let value = self.stack().pop_int();
                self.array_store(value)?;
            }
            inst::LASTORE => {
                let value = self.stack().pop_long();
                self.array_store(value)?;
            }
            inst::FASTORE => {
                let value = self.stack().pop_float();
                self.array_store(value)?;
            }
            inst::DASTORE => {
                let value = self.stack().pop_double();
                self.array_store(value)?;
            }
            inst::AASTORE => self.aastore()?,
            inst::BASTORE => {
                let value = self.stack().pop_int() as i8;
                self.array_store(value)?;
            }
            inst::CASTORE => {
                let value = self.stack().pop_int() as u16;
                self.array_store(value)?;
            }
            inst::SASTORE => {
                let value = self.stack().pop_int() as i16;
                self.array_store(value)?;
            }

            // stack
            inst::POP => {
                self.pop_slots::<1>();
            }
            inst::POP2 => {
                self.pop_slots::<2>();
            }
            inst::DUP => {
                let [v1] = self.pop_slots();
                self.push_slots(&[v1, v1]);
            }
            inst::DUP_X1 => {
                let [v1, v2] = self.pop_slots();
                self.push_slots(&[v1, v2, v1]);
            }
            inst::DUP_X2 => {
                let [v1, v2, v3] = self.pop_slots();
                self.push_slots(&[v1, v3, v2, v1]);
            }
            inst::DUP2 => {
                let [v1, v2] = self.pop_slots();
                self.push_slots(&[v2, v1, v2, v1]);
            }
            inst::DUP2_X1 => {
                let [v1, v2, v3] = self.pop_slots();
                self.push_slots(&[v2, v1, v3, v2, v1]);
            }
            inst::DUP2_X2 => {
                let [v1, v2, v3, v4] = self.pop_slots();
                self.push_slots(&[v2, v1, v4, v3, v2, v1]);
            }
            inst::SWAP => {
                let [v1, v2] = self.pop_slots();
                self.push_slots(&[v1, v2]);
            }

            // arithmetic
            inst::IADD => self.int_op(i32::wrapping_add),
            inst::LADD => self.long_op(i64::wrapping_add),
            inst::FADD => self.float_op(|a, b| a + b),
            inst::DADD => self.double_op(|a, b| a + b),
            inst::ISUB => self.int_op(i32::wrapping_sub),
            inst::LSUB => self.long_op(i64::wrapping_sub),
            inst::FSUB => self.float_op(|a, b| a - b),
            inst::DSUB => self.double_op(|a, b| a - b),
            inst::IMUL => self.int_op(i32::wrapping_mul),
            inst::LMUL => self.long_op(i64::wrapping_mul),
            inst::FMUL => self.float_op(|a, b| a * b),
            inst::DMUL => self.double_op(|a, b| a * b),
            inst::IDIV => {
                let [b, a] = [self.stack().pop_int(), self.stack().pop_int()];
                if b == 0 {
                    return Err(divide_by_zero());
                }
                self.stack().push_int(a.wrapping_div(b));
            }
            inst::LDIV => {
                let [b, a] = [self.stack().pop_long(), self.stack().pop_long()];
                if b == 0 {
                    return Err(divide_by_zero());
                }
                self.stack().push_long(a.wrapping_div(b));
            }
            inst::FDIV => self.float_op(|a, b| a / b),
            inst::DDIV => self.double_op(|a, b| a / b),
            inst::IREM => {
                let [b, a] = [self.stack().pop_int(), self.stack().pop_int()];
                if b == 0 {
                    return Err(divide_by_zero());
                }
                self.stack().push_int(a.wrapping_rem(b));
            }
            inst::LREM => {
                let [b, a] = [self.stack().pop_long(), self.stack().pop_long()];
                if b == 0 {
                    return Err(divide_by_zero());
                }
                self.stack().push_long(a.wrapping_rem(b));
            }
            inst::FREM => self.float_op(|a, b| a % b),
            inst::DREM => self.double_op(|a, b| a % b),
            inst::INEG => {
                let value = self.stack().pop_int();
                self.stack().push_int(value.wrapping_neg());
            }
            inst::LNEG => {
                let value = self.stack().pop_long();
                self.stack().push_long(value.wrapping_neg());
            }
            inst::FNEG => {
                let value = self.stack().pop_float();
                self.stack().push_float(-value);
            }
            inst::DNEG => {
                let value = self.stack().pop_double();
                self.stack().push_double(-value);
            }
            inst::ISHL => self.int_op(|a, b| a << (b & 0x1f)),
            inst::ISHR => self.int_op(|a, b| a >> (b & 0x1f)),
            inst::IUSHR => self.int_op(|a, b| ((a as u32) >> (b & 0x1f)) as i32),
            inst::LSHL => self.long_shift(|a, count| a << count),
            inst::LSHR => self.long_shift(|a, count| a >> count),
            inst::LUSHR => self.long_shift(|a, count| ((a as u64) >> count) as i64),
            inst::IAND => self.int_op(|a, b| a & b),
            inst::LAND => self.long_op(|a, b| a & b),
            inst::IOR => self.int_op(|a, b| a | b),
            inst::LOR => self.long_op(|a, b| a | b),
            inst::IXOR => self.int_op(|a, b| a ^ b),
            inst::LXOR => self.long_op(|a, b| a ^ b),
            inst::IINC => {
                let index = self.read_u8() as usize;
                let delta = self.read_i8() as i32;
                self.iinc(index, delta);
            }

            // conversion; float to integer casts saturate and map NaN to 0
            inst::I2L => {
                let value = self.stack().pop_int();
                self.stack().push_long(value as i64);
            }
            inst::I2F => {
                let value = self.stack().pop_int();
                self.stack().push_float(value as f32);
            }
            inst::I2D => {
                let value = self.stack().pop_int();
                self.stack().push_double(value as f64);
            }
            inst::L2I => {
                let value = self.stack().pop_long();
                self.stack().push_int(value as i32);
            }
            inst::L2F => {
                let value = self.stack().pop_long();
                self.stack().push_float(value as f32);
            }
            inst::L2D => {
                let value = self.stack().pop_long();
                self.stack().push_double(value as f64);
            }
            inst::F2I => {
                let value = self.stack().pop_float();
                self.stack().push_int(value as i32);
            }
            inst::F2L => {
                let value = self.stack().pop_float();
                self.stack().push_long(value as i64);
            }
            inst::F2D => {
                let value = self.stack().pop_float();
                self.stack().push_double(value as f64);
            }
            inst::D2I => {
                let value = self.stack().pop_double();
                self.stack().push_int(value as i32);
            }
            inst::D2L => {
                let value = self.stack().pop_double();
                self.stack().push_long(value as i64);
            }
            inst::D2F => {
                let value = self.stack().pop_double();
                self.stack().push_float(value as f32);
            }
            inst::I2B => {
                let value = self.stack().pop_int();
                self.stack().push_int(value as i8 as i32);
            }
            inst::I2C => {
                let value = self.stack().pop_int();
                self.stack().push_int(value as u16 as i32);
            }
            inst::I2S => {
                let value = self.stack().pop_int();
                self.stack().push_int(value as i16 as i32);
            }

            // comparing
            inst::LCMP => {
                let [b, a] = [self.stack().pop_long(), self.stack().pop_long()];
                self.push_ordering(a.partial_cmp(&b), 0);
            }
            inst::FCMPL | inst::FCMPG => {
                let [b, a] = [self.stack().pop_float(), self.stack().pop_float()];
                let nan = if op == inst::FCMPG { 1 } else { -1 };
                self.push_ordering(a.partial_cmp(&b), nan);
            }
            inst::DCMPL | inst::DCMPG => {
                let [b, a] = [self.stack().pop_double(), self.stack().pop_double()];
                let nan = if op == inst::DCMPG { 1 } else { -1 };
                self.push_ordering(a.partial_cmp(&b), nan);
            }

            // branch
            inst::IFEQ..=inst::IFLE => {
                let value = self.stack().pop_int();
                let jump = match op {
                    inst::IFEQ => value == 0,
                    inst::IFNE => value != 0,
                    inst::IFLT => value < 0,
                    inst::IFGE => value >= 0,
                    inst::IFGT => value > 0,
                    _ => value <= 0,
                };
                self.branch_if(jump);
            }
            inst::IF_ICMPEQ..=inst::IF_ICMPLE => {
                let [b, a] = [self.stack().pop_int(), self.stack().pop_int()];
                let jump = match op {
                    inst::IF_ICMPEQ => a == b,
                    inst::IF_ICMPNE => a != b,
                    inst::IF_ICMPLT => a < b,
                    inst::IF_ICMPGE => a >= b,
                    inst::IF_ICMPGT => a > b,
                    _ => a <= b,
                };
                self.branch_if(jump);
            }
            inst::IF_ACMPEQ | inst::IF_ACMPNE => {
                let [b, a] = [self.stack().pop_reference(), self.stack().pop_reference()];
                self.branch_if((a == b) == (op == inst::IF_ACMPEQ));
            }
            inst::IFNULL | inst::IFNONNULL => {
                let value = self.stack().pop_reference();
                self.branch_if(value.is_none() == (op == inst::IFNULL));
            }
            inst::GOTO => self.branch_if(true),
            inst::GOTO_W => {
                let offset = self.read_i32();
                self.jump(offset);
            }
            inst::JSR => {
                let offset = self.read_i16() as i32;
                let return_address = self.frame.next_pc as i32;
                self.stack().push_int(return_address);
                self.jump(offset);
            }
            inst::JSR_W => {
                let offset = self.read_i32();
                let return_address = self.frame.next_pc as i32;
                self.stack().push_int(return_address);
                self.jump(offset);
            }
            inst::RET => {
                let index = self.read_u8() as usize;
                self.frame.next_pc = self.frame.local_vars.get_int(index) as usize;
            }
            inst::TABLESWITCH => self.table_switch(),
            inst::LOOKUPSWITCH => self.lookup_switch(),

            // return
            inst::IRETURN | inst::FRETURN | inst::ARETURN => {
                let [v1] = self.pop_slots();
                return Ok(Next::Return {
                    v1: Some(v1),
                    v2: None,
                });
            }
            inst::LRETURN | inst::DRETURN => {
                let [high, low] = self.pop_slots();
                return Ok(Next::Return {
                    v1: Some(low),
                    v2: Some(high),
                });
            }
            inst::RETURN => return Ok(Next::Return { v1: None, v2: None }),

            // field
            inst::GETSTATIC => return self.get_static(),
            inst::PUTSTATIC => return self.put_static(),
            inst::GETFIELD => self.get_field()?,
            inst::PUTFIELD => self.put_field()?,

            // invoke
            inst::INVOKEVIRTUAL => return self.invoke_virtual(),
            inst::INVOKESPECIAL => return self.invoke_special(),
            inst::INVOKESTATIC => return self.invoke_static(),
            inst::INVOKEINTERFACE => return self.invoke_interface(),
            inst::INVOKEDYNAMIC => {
                let index = self.read_u16();
                return Err(Exception::unsupported(format!(
                    "invokedynamic #{index} in {}",
                    describe(&self.frame.method)
                )));
            }
            inst::INVOKENATIVE => return Ok(Next::InvokeNative),

            // object
            inst::NEW => return self.new_object(),
            inst::NEWARRAY => self.new_array()?,
            inst::ANEWARRAY => self.new_reference_array()?,
            inst::MULTIANEWARRAY => self.new_multi_array()?,
            inst::ARRAYLENGTH => {
                let array = self.pop_non_null()?;
                let length = self.vm.heap().get(array).array_length();
                self.stack().push_int(length as i32);
            }
            inst::ATHROW => {
                let throwable = self.pop_non_null()?;
                return Err(Exception::new(throwable));
            }
            inst::CHECKCAST => self.check_cast()?,
            inst::INSTANCEOF => self.instance_of()?,
            inst::MONITORENTER | inst::MONITOREXIT => {
                self.pop_non_null()?;
            }

            inst::WIDE => self.wide()?,

            _ => {
                return Err(Exception::unsupported(format!(
                    "opcode 0x{op:02x} at {pc} in {}",
                    describe(&self.frame.method)
                )));
            }
        }
        Ok(Next::Continue)
    }

    /// The instruction after `wide`, with a 16-bit local index (and a 16-bit `iinc` delta).
    fn wide(&mut self) -> NativeResult<()> {
        let op = self.read_u8();
        let index = self.read_u16() as usize;
        match op {
            inst::ILOAD | inst::FLOAD | inst::ALOAD => self.load(index),
            inst::LLOAD | inst::DLOAD => self.load_long(index),
            inst::ISTORE | inst::FSTORE | inst::ASTORE => self.store(index),
            inst::LSTORE | inst::DSTORE => self.store_long(index),
            inst::RET => {
                self.frame.next_pc = self.frame.local_vars.get_int(index) as usize;
            }
            inst::IINC => {
                let delta = self.read_i16() as i32;
                self.iinc(index, delta);
            }
            _ => {
                return Err(Exception::new_vm_msg(
                    CLASS_FORMAT_ERROR,
                    format!("wide cannot modify opcode 0x{op:02x}"),
                ));
            }
        }
        Ok(())
    }

    #[inline]
    fn stack(&mut self) -> &mut OperandStack {
        &mut self.frame.operand_stack
    }

    /// `N` slots, top of the stack first.
    #[inline]
    fn pop_slots<const N: usize>(&mut self) -> [Slot; N] {
        std::array::from_fn(|_| self.frame.operand_stack.pop_slot())
    }

    /// Pushes `slots` in order, so the last one ends up on top.
    #[inline]
    fn push_slots(&mut self, slots: &[Slot]) {
        for slot in slots {
            self.frame.operand_stack.push_slot(*slot);
        }
    }

    fn pop_non_null(&mut self) -> NativeResult<Reference> {
        self.stack()
            .pop_reference()
            .ok_or_else(|| Exception::new_vm(NULL_POINTER_EXCEPTION))
    }

    #[inline]
    fn read_u8(&mut self) -> u8 {
        let byte = self.code[self.frame.next_pc];
        self.frame.next_pc += 1;
        byte
    }

    #[inline]
    fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }

    #[inline]
    fn read_u16(&mut self) -> u16 {
        let high = self.read_u8() as u16;
        let low = self.read_u8() as u16;
        (high << 8) | low
    }

    #[inline]
    fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    #[inline]
    fn read_i32(&mut self) -> i32 {
        let high = self.read_u16() as u32;
        let low = self.read_u16() as u32;
        ((high << 16) | low) as i32
    }

    #[inline]
    fn load(&mut self, index: usize) {
        let slot = self.frame.local_vars.get_slot(index);
        self.stack().push_slot(slot);
    }

    #[inline]
    fn load_long(&mut self, index: usize) {
        self.load(index);
        self.load(index + 1);
    }

    #[inline]
    fn store(&mut self, index: usize) {
        let [slot] = self.pop_slots();
        self.frame.local_vars.set_slot(index, slot);
    }

    #[inline]
    fn store_long(&mut self, index: usize) {
        let [high, low] = self.pop_slots();
        self.frame.local_vars.set_slot(index, low);
        self.frame.local_vars.set_slot(index + 1, high);
    }

    #[inline]
    fn iinc(&mut self, index: usize, delta: i32) {
        let value = self.frame.local_vars.get_int(index);
        self.frame.local_vars.set_int(index, value.wrapping_add(delta));
    }

    #[inline]
    fn int_op(&mut self, op: impl FnOnce(i32, i32) -> i32) {
        let b = self.stack().pop_int();
        let a = self.stack().pop_int();
        self.stack().push_int(op(a, b));
    }

    #[inline]
    fn long_op(&mut self, op: impl FnOnce(i64, i64) -> i64) {
        let b = self.stack().pop_long();
        let a = self.stack().pop_long();
        self.stack().push_long(op(a, b));
    }

    /// The shift count is an int masked to 6 bits.
    #[inline]
    fn long_shift(&mut self, op: impl FnOnce(i64, u32) -> i64) {
        let count = (self.stack().pop_int() & 0x3f) as u32;
        let value = self.stack().pop_long();
        self.stack().push_long(op(value, count));
    }

    #[inline]
    fn float_op(&mut self, op: impl FnOnce(f32, f32) -> f32) {
        let b = self.stack().pop_float();
        let a = self.stack().pop_float();
        self.stack().push_float(op(a, b));
    }

    #[inline]
    fn double_op(&mut self, op: impl FnOnce(f64, f64) -> f64) {
        let b = self.stack().pop_double();
        let a = self.stack().pop_double();
        self.stack().push_double(op(a, b));
    }

    /// `None` (a NaN operand) pushes `nan`.
    #[inline]
    fn push_ordering(&mut self, ordering: Option<Ordering>, nan: i32) {
        let value = match ordering {
            None => nan,
            Some(Ordering::Less) => -1,
            Some(Ordering::Equal) => 0,
            Some(Ordering::Greater) => 1,
        };
        self.stack().push_int(value);
    }

    /// Offsets are relative to the address of the branch instruction.
    #[inline]
    fn jump(&mut self, offset: i32) {
        self.frame.next_pc = self.frame.pc.wrapping_add_signed(offset as isize);
    }

    #[inline]
    fn branch_if(&mut self, jump: bool) {
        let offset = self.read_i16();
        if jump {
            self.jump(offset as i32);
        }
    }

    /// Operands start at the next 4-byte boundary after the opcode.
    fn skip_switch_padding(&mut self) {
        self.frame.next_pc = (self.frame.pc + 4) & !3;
    }

    fn table_switch(&mut self) {
        self.skip_switch_padding();
        let default = self.read_i32();
        let low = self.read_i32();
        let high = self.read_i32();
        let key = self.stack().pop_int();
        if key < low || key > high {
            self.jump(default);
            return;
        }
        self.frame.next_pc += 4 * (key as i64 - low as i64) as usize;
        let offset = self.read_i32();
        self.jump(offset);
    }

    fn lookup_switch(&mut self) {
        self.skip_switch_padding();
        let default = self.read_i32();
        let npairs = self.read_i32();
        let key = self.stack().pop_int();
        for _ in 0..npairs {
            let value = self.read_i32();
            let offset = self.read_i32();
            if key == value {
                self.jump(offset);
                return;
            }
        }
        self.jump(default);
    }

    /// Backs up to the current instruction so it runs again.
    #[inline]
    fn rewind(&mut self) {
        self.frame.next_pc = self.frame.pc;
    }

    fn resolve_class(&self, index: u16) -> NativeResult<Arc<Class>> {
        self.class
            .constant_pool
            .class_ref(index)?
            .resolved_class(self.vm, &self.class)
    }

    fn ldc(&mut self, index: u16) -> NativeResult<()> {
        let class = Arc::clone(&self.class);
        match class.constant_pool.get(index)? {
            Constant::Integer(value) => self.stack().push_int(*value),
            Constant::Float(value) => self.stack().push_float(*value),
            Constant::String(value) => {
                let string = self.vm.intern_string(value)?;
                self.stack().push_reference(Some(string));
            }
            Constant::Class(class_ref) => {
                let loaded = class_ref.resolved_class(self.vm, &class)?;
                let mirror = self.vm.class_object(&loaded)?;
                self.stack().push_reference(Some(mirror));
            }
            other => {
                return Err(Exception::unsupported(format!("ldc of {other:?}")));
            }
        }
        Ok(())
    }

    fn ldc2(&mut self, index: u16) -> NativeResult<()> {
        let class = Arc::clone(&self.class);
        match class.constant_pool.get(index)? {
            Constant::Long(value) => self.stack().push_long(*value),
            Constant::Double(value) => self.stack().push_double(*value),
            other => {
                return Err(Exception::unsupported(format!("ldc2_w of {other:?}")));
            }
        }
        Ok(())
    }

    /// Pops the index and the array reference, checking both.
    fn pop_array_element(&mut self) -> NativeResult<(Arc<Object>, i32)> {
        let index = self.stack().pop_int();
        let array = self.pop_non_null()?;
        let array = self.vm.heap().get(array);
        let length = array.array_length();
        if index < 0 || index as usize >= length {
            return Err(Exception::new_vm_msg(
                ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION,
                format!("Index {index} out of bounds for length {length}"),
            ));
        }
        Ok((array, index))
    }

    fn array_load<T: ArrayType>(&mut self) -> NativeResult<T> {
        let (array, index) = self.pop_array_element()?;
        array
            .array_get::<T>(index)
            .ok_or_else(|| wrong_array_kind(&array))
    }

    fn array_store<T: ArrayType>(&mut self, value: T) -> NativeResult<()> {
        let (array, index) = self.pop_array_element()?;
        if !array.array_set(index, value) {
            return Err(wrong_array_kind(&array));
        }
        Ok(())
    }

    fn aastore(&mut self) -> NativeResult<()> {
        let value = self.stack().pop_reference();
        let (array, index) = self.pop_array_element()?;
        if let Some(value) = value {
            let value_class = Arc::clone(self.vm.heap().get(value).class());
            if let Some(component) = array.class().component_class() {
                if !component.is_assignable_from(&value_class) {
                    return Err(Exception::new_vm_msg(
                        ARRAY_STORE_EXCEPTION,
                        value_class.java_name(),
                    ));
                }
            }
        }
        if !array.array_set(index, value) {
            return Err(wrong_array_kind(&array));
        }
        Ok(())
    }

    fn new_object(&mut self) -> NativeResult<Next> {
        let index = self.read_u16();
        let class = self.resolve_class(index)?;
        if class.is_interface() || class.is_abstract() {
            return Err(Exception::new_vm_msg(
                INSTANTIATION_ERROR,
                class.java_name(),
            ));
        }
        if !class.init_started() {
            self.rewind();
            return Ok(Next::Initialize(class));
        }
        let object = self.vm.heap().allocate(Object::new_instance(class));
        self.stack().push_reference(Some(object));
        Ok(Next::Continue)
    }

    fn new_array(&mut self) -> NativeResult<()> {
        let atype = self.read_u8();
        let length = array_length(self.stack().pop_int())?;
        let class_name = match atype {
            inst::T_BOOLEAN => "[Z",
            inst::T_CHAR => "[C",
            inst::T_FLOAT => "[F",
            inst::T_DOUBLE => "[D",
            inst::T_BYTE => "[B",
            inst::T_SHORT => "[S",
            inst::T_INT => "[I",
            inst::T_LONG => "[J",
            _ => {
                return Err(Exception::new_vm_msg(
                    CLASS_FORMAT_ERROR,
                    format!("invalid newarray type {atype}"),
                ));
            }
        };
        let class = self.vm.load_class(class_name)?;
        let array = self
            .vm
            .heap()
            .allocate(Object::new_array(class, ArrayData::new(class_name, length)));
        self.stack().push_reference(Some(array));
        Ok(())
    }

    fn new_reference_array(&mut self) -> NativeResult<()> {
        let index = self.read_u16();
        let length = array_length(self.stack().pop_int())?;
        let component = self.resolve_class(index)?;
        let class = self
            .vm
            .load_class(&array_class_name(&component.class_name))?;
        let array = self.vm.heap().allocate(Object::new_array(
            class,
            ArrayData::References(vec![None; length]),
        ));
        self.stack().push_reference(Some(array));
        Ok(())
    }

    fn new_multi_array(&mut self) -> NativeResult<()> {
        let index = self.read_u16();
        let dimensions = self.read_u8() as usize;
        if dimensions == 0 {
            return Err(Exception::new_vm_msg(
                CLASS_FORMAT_ERROR,
                "multianewarray with no dimensions",
            ));
        }
        let mut counts = vec![0; dimensions];
        for count in counts.iter_mut().rev() {
            *count = self.stack().pop_int();
        }
        let lengths = counts
            .into_iter()
            .map(array_length)
            .collect::<NativeResult<Vec<_>>>()?;
        let class = self.resolve_class(index)?;
        let array = allocate_multi_array(self.vm, &class, &lengths)?;
        self.stack().push_reference(Some(array));
        Ok(())
    }

    fn check_cast(&mut self) -> NativeResult<()> {
        let index = self.read_u16();
        let Some(object) = self.stack().get_ref_from_top(0) else {
            return Ok(());
        };
        let class = self.resolve_class(index)?;
        let object_class = Arc::clone(self.vm.heap().get(object).class());
        if !class.is_assignable_from(&object_class) {
            return Err(Exception::new_vm_msg(
                CLASS_CAST_EXCEPTION,
                format!(
                    "class {} cannot be cast to class {}",
                    object_class.java_name(),
                    class.java_name()
                ),
            ));
        }
        Ok(())
    }

    fn instance_of(&mut self) -> NativeResult<()> {
        let index = self.read_u16();
        let Some(object) = self.stack().pop_reference() else {
            self.stack().push_int(0);
            return Ok(());
        };
        let class = self.resolve_class(index)?;
        let object_class = Arc::clone(self.vm.heap().get(object).class());
        self.stack()
            .push_boolean(class.is_assignable_from(&object_class));
        Ok(())
    }

    fn resolve_field(&mut self, is_static: bool) -> NativeResult<Arc<Field>> {
        let index = self.read_u16();
        let field = self
            .class
            .constant_pool
            .field_ref(index)?
            .resolved_field(self.vm, &self.class)?;
        if field.is_static() != is_static {
            let kind = if is_static { "static" } else { "non-static" };
            return Err(Exception::new_vm_msg(
                INCOMPATIBLE_CLASS_CHANGE_ERROR,
                format!(
                    "Expected {kind} field {}.{}",
                    field.class().java_name(),
                    field.name
                ),
            ));
        }
        Ok(field)
    }

    /// Final fields are written only by `initializer` of their declaring class.
    fn check_final_write(&self, field: &Field, initializer: &str) -> NativeResult<()> {
        if !field.is_final()
            || (field.is_declared_by(&self.class) && &*self.frame.method.name == initializer)
        {
            return Ok(());
        }
        Err(Exception::new_vm_msg(
            ILLEGAL_ACCESS_ERROR,
            format!(
                "Update to final field {}.{} attempted from {}",
                field.class().java_name(),
                field.name,
                describe(&self.frame.method)
            ),
        ))
    }

    /// A protected member of a superclass in another package is reachable only through
    /// objects of the current class or its subclasses.
    fn check_protected(&self, member: &ClassMember, object_class: &Class) -> NativeResult<()> {
        if !member.is_protected() {
            return Ok(());
        }
        let owner = member.class();
        if !self.class.is_subclass_of(&owner) || owner.is_same_package(&self.class) {
            return Ok(());
        }
        // arrays override clone() publicly
        if object_class.is_array() && &*member.name == "clone" {
            return Ok(());
        }
        if ptr::eq(object_class, self.class.as_ref()) || object_class.is_subclass_of(&self.class)
        {
            return Ok(());
        }
        Err(Exception::new_vm_msg(
            ILLEGAL_ACCESS_ERROR,
            format!(
                "class {} tried to access protected member {}.{} through {}",
                self.class.java_name(),
                owner.java_name(),
                member.name,
                object_class.java_name()
            ),
        ))
    }

    fn get_static(&mut self) -> NativeResult<Next> {
        let field = self.resolve_field(true)?;
        let owner = field.class();
        if !owner.init_started() {
            self.rewind();
            return Ok(Next::Initialize(owner));
        }
        let statics = owner.static_vars.read();
        self.frame
            .operand_stack
            .push_slot(statics.get_slot(field.slot_id));
        if field.is_long() {
            self.frame
                .operand_stack
                .push_slot(statics.get_slot(field.slot_id + 1));
        }
        Ok(Next::Continue)
    }

    fn put_static(&mut self) -> NativeResult<Next> {
        let field = self.resolve_field(true)?;
        self.check_final_write(&field, "<clinit>")?;
        let owner = field.class();
        if !owner.init_started() {
            self.rewind();
            return Ok(Next::Initialize(owner));
        }
        let mut statics = owner.static_vars.write();
        if field.is_long() {
            let [high, low] = self.pop_slots();
            statics.set_slot(field.slot_id, low);
            statics.set_slot(field.slot_id + 1, high);
        } else {
            let [value] = self.pop_slots();
            statics.set_slot(field.slot_id, value);
        }
        Ok(Next::Continue)
    }

    fn get_field(&mut self) -> NativeResult<()> {
        let field = self.resolve_field(false)?;
        let object = self.pop_non_null()?;
        let object = self.vm.heap().get(object);
        self.check_protected(&field.member, object.class())?;
        let slot_id = field.slot_id;
        let (low, high) = object.with_fields(|fields| {
            let high = field.is_long().then(|| fields.get_slot(slot_id + 1));
            (fields.get_slot(slot_id), high)
        });
        self.stack().push_slot(low);
        if let Some(high) = high {
            self.stack().push_slot(high);
        }
        Ok(())
    }

    fn put_field(&mut self) -> NativeResult<()> {
        let field = self.resolve_field(false)?;
        self.check_final_write(&field, "<init>")?;
        let (low, high) = if field.is_long() {
            let [high, low] = self.pop_slots();
            (low, Some(high))
        } else {
            let [value] = self.pop_slots();
            (value, None)
        };
        let object = self.pop_non_null()?;
        let object = self.vm.heap().get(object);
        self.check_protected(&field.member, object.class())?;
        let slot_id = field.slot_id;
        object.with_fields_mut(|fields| {
            fields.set_slot(slot_id, low);
            if let Some(high) = high {
                fields.set_slot(slot_id + 1, high);
            }
        });
        Ok(())
    }

    /// The receiver sits below the arguments.
    fn receiver_class(&mut self, method: &Method) -> NativeResult<Arc<Class>> {
        let depth = method.arg_slot_count.saturating_sub(1);
        let receiver = self
            .stack()
            .get_ref_from_top(depth)
            .ok_or_else(|| Exception::new_vm(NULL_POINTER_EXCEPTION))?;
        Ok(Arc::clone(self.vm.heap().get(receiver).class()))
    }

    fn invoke_virtual(&mut self) -> NativeResult<Next> {
        let index = self.read_u16();
        let method = self
            .class
            .constant_pool
            .method_ref(index)?
            .resolved_method(self.vm, &self.class)?;
        if method.is_static() {
            return Err(Exception::new_vm_msg(
                INCOMPATIBLE_CLASS_CHANGE_ERROR,
                format!("Expecting non-static method {}", describe(&method)),
            ));
        }
        let receiver_class = self.receiver_class(&method)?;
        self.check_protected(&method.member, &receiver_class)?;
        let target = if method.is_private() {
            Some(Arc::clone(&method))
        } else {
            receiver_class.lookup_virtual_method(&method.name, &method.descriptor)
        };
        let target = concrete(target, &receiver_class, &method)?;
        Ok(Next::Invoke(target))
    }

    fn invoke_special(&mut self) -> NativeResult<Next> {
        let index = self.read_u16();
        let method_ref = self.class.constant_pool.any_method_ref(index)?;
        let resolved_class = method_ref
            .member()
            .class_ref()
            .resolved_class(self.vm, &self.class)?;
        let method = method_ref.resolved(self.vm, &self.class)?;
        let is_init = &*method.name == "<init>";
        if is_init && !method.is_declared_by(&resolved_class) {
            return Err(Exception::new_vm_msg(
                NO_SUCH_METHOD_ERROR,
                format!("{}.<init>{}", resolved_class.java_name(), method.descriptor),
            ));
        }
        if method.is_static() {
            return Err(Exception::new_vm_msg(
                INCOMPATIBLE_CLASS_CHANGE_ERROR,
                format!("Expecting non-static method {}", describe(&method)),
            ));
        }
        let receiver_class = self.receiver_class(&method)?;
        self.check_protected(&method.member, &receiver_class)?;

        let target = match self.class.super_class() {
            Some(super_class)
                if self.class.is_super()
                    && !is_init
                    && !resolved_class.is_interface()
                    && self.class.is_subclass_of(&resolved_class) =>
            {
                super_class.lookup_virtual_method(&method.name, &method.descriptor)
            }
            _ => Some(Arc::clone(&method)),
        };
        let target = concrete(target, &resolved_class, &method)?;
        Ok(Next::Invoke(target))
    }

    fn invoke_static(&mut self) -> NativeResult<Next> {
        let index = self.read_u16();
        let method = self
            .class
            .constant_pool
            .any_method_ref(index)?
            .resolved(self.vm, &self.class)?;
        if !method.is_static() {
            return Err(Exception::new_vm_msg(
                INCOMPATIBLE_CLASS_CHANGE_ERROR,
                format!("Expected static method {}", describe(&method)),
            ));
        }
        let owner = method.class();
        if !owner.init_started() {
            self.rewind();
            return Ok(Next::Initialize(owner));
        }
        Ok(Next::Invoke(method))
    }

    fn invoke_interface(&mut self) -> NativeResult<Next> {
        let index = self.read_u16();
        // count and a zero byte, both redundant
        self.read_u16();
        let method_ref = self.class.constant_pool.interface_method_ref(index)?;
        let interface = method_ref
            .member()
            .class_ref()
            .resolved_class(self.vm, &self.class)?;
        let method = method_ref.resolved_interface_method(self.vm, &self.class)?;
        if method.is_static() || method.is_private() {
            return Err(Exception::new_vm_msg(
                INCOMPATIBLE_CLASS_CHANGE_ERROR,
                format!("Expected public instance method {}", describe(&method)),
            ));
        }
        let receiver_class = self.receiver_class(&method)?;
        if !interface.is_assignable_from(&receiver_class) {
            return Err(Exception::new_vm_msg(
                INCOMPATIBLE_CLASS_CHANGE_ERROR,
                format!(
                    "Class {} does not implement the requested interface {}",
                    receiver_class.java_name(),
                    interface.java_name()
                ),
            ));
        }
        let target = receiver_class.lookup_virtual_method(&method.name, &method.descriptor);
        let target = concrete(target, &receiver_class, &method)?;
        if !target.is_public() {
            return Err(Exception::new_vm_msg(
                ILLEGAL_ACCESS_ERROR,
                format!("{} is not public", describe(&target)),
            ));
        }
        Ok(Next::Invoke(target))
    }
}

/// `pkg.Class.name(descriptor)`
fn describe(method: &Method) -> String {
    format!(
        "{}.{}{}",
        method.class().java_name(),
        method.name,
        method.descriptor
    )
}

fn divide_by_zero() -> Exception {
    Exception::new_vm_msg(ARITHMETIC_EXCEPTION, "/ by zero")
}

fn wrong_array_kind(array: &Object) -> Exception {
    Exception::new_vm_msg(
        INCOMPATIBLE_CLASS_CHANGE_ERROR,
        format!("unexpected element type for {}", array.class().java_name()),
    )
}

fn array_length(count: i32) -> NativeResult<usize> {
    usize::try_from(count)
        .map_err(|_| Exception::new_vm_msg(NEGATIVE_ARRAY_SIZE_EXCEPTION, count.to_string()))
}

/// A dispatch result that can actually run: present and not abstract.
fn concrete(
    target: Option<Arc<Method>>,
    class: &Class,
    method: &Method,
) -> NativeResult<Arc<Method>> {
    target.filter(|target| !target.is_abstract()).ok_or_else(|| {
        Exception::new_vm_msg(
            ABSTRACT_METHOD_ERROR,
            format!("{}.{}{}", class.java_name(), method.name, method.descriptor),
        )
    })
}

/// Outer dimensions hold references to freshly allocated inner arrays.
fn allocate_multi_array(
    vm: &Vm,
    class: &Arc<Class>,
    lengths: &[usize],
) -> NativeResult<Reference> {
    let length = lengths[0];
    let data = match (&lengths[1..], class.component_class()) {
        (inner, Some(component)) if !inner.is_empty() && component.is_array() => {
            let elements = (0..length)
                .map(|_| allocate_multi_array(vm, component, inner).map(Some))
                .collect::<NativeResult<Vec<_>>>()?;
            ArrayData::References(elements)
        }
        _ => ArrayData::new(&class.class_name, length),
    };
    Ok(vm.heap().allocate(Object::new_array(Arc::clone(class), data)))
}
