use crate::runtime::{
    Extra, NativeEnv, NativeResult, Vm, famous_classes::THROWABLE,
    interpreter::capture_stack_trace,
};

// private native Throwable fillInStackTrace(int dummy);
fn fill_in_stack_trace(env: &mut NativeEnv<'_>) -> NativeResult<()> {
    let this = env.this()?;
    let throwable = env.vm.heap().get(this);
    // this native, fillInStackTrace(), and one constructor per class down to Throwable
    let skip = throwable.class().depth() + 2;
    let trace = capture_stack_trace(env.vm, env.thread, skip);
    throwable.set_extra(Extra::StackTrace(trace.into()));
    env.stack().push_reference(Some(this));
    Ok(())
}

pub(super) fn register_natives(vm: &Vm) {
    vm.register_native(
        THROWABLE,
        "fillInStackTrace",
        "(I)Ljava/lang/Throwable;",
        fill_in_stack_trace,
    );
}

#[cfg(test)]
mod tests {
    use crate::{
        consts::{ACC_PUBLIC, ACC_STATIC},
        runtime::{
            Exception,
            interpreter::instructions as inst,
            test_support::{ClassFileBuilder, test_vm},
        },
    };

    #[test]
    fn test_constructor_frames_are_skipped() {
        let mut builder = ClassFileBuilder::new("pkg/Main", Some("java/lang/Object"));
        builder.set_source_file("Main.java");
        let exception = builder.class("java/lang/RuntimeException");
        let init = builder.method_ref("java/lang/RuntimeException", "<init>", "()V");
        let [e_hi, e_lo] = exception.to_be_bytes();
        let [i_hi, i_lo] = init.to_be_bytes();
        builder.add_method_with_lines(
            ACC_PUBLIC | ACC_STATIC,
            "run",
            "()V",
            2,
            0,
            &[
                inst::NEW, e_hi, e_lo,
                inst::DUP,
                inst::INVOKESPECIAL, i_hi, i_lo,
                inst::ATHROW,
            ],
            &[(0, 12), (7, 13)],
        );
        let vm = test_vm(vec![builder.build()]);
        let class = vm.load_class("pkg/Main").unwrap();
        let run = class.get_method("run", "()V").unwrap();

        let mut thread = vm.new_thread();
        let err = vm.invoke(&mut thread, run, &[]).unwrap_err();
        let Exception::UserException(throwable) = err else {
            panic!("expected a thrown exception, got {err:?}");
        };
        let trace = vm.heap().get(throwable).stack_trace().unwrap();
        let lines: Vec<String> = trace.iter().map(ToString::to_string).collect();
        // captured by the constructor, not at the throw
        assert_eq!(lines, vec!["pkg.Main.run(Main.java:12)"]);
    }
}
