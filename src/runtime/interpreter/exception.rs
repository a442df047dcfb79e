use std::sync::Arc;

use crate::runtime::{
    Class, Exception, Extra, Frame, NativeResult, Object, Reference, StackTraceElement, Thread,
    UncaughtException, Vm, VmError,
};

/// One element per live frame from the top down, shim frames excluded. The first `skip`
/// elements are dropped.
pub(crate) fn capture_stack_trace(vm: &Vm, thread: &Thread, skip: usize) -> Vec<StackTraceElement> {
    thread
        .frames()
        .iter()
        .rev()
        .filter(|frame| !vm.is_shim(&frame.method))
        .skip(skip)
        .map(|frame| {
            let method = &frame.method;
            let class = method.class();
            StackTraceElement {
                file_name: class.source_file.clone(),
                class_name: class.java_name(),
                method_name: Arc::clone(&method.name),
                line_number: method.line_number(frame.pc),
            }
        })
        .collect()
}

/// Turns a VM-raised error into a heap object. No constructor runs; `detailMessage` is set
/// directly when the class has one.
fn materialize(vm: &Vm, class_name: &str, message: &str) -> NativeResult<Reference> {
    let class = vm.load_class(class_name)?;
    let has_message_field = class
        .lookup_field("detailMessage", "Ljava/lang/String;")
        .is_some_and(|field| !field.is_static());
    let throwable = vm.heap().allocate(Object::new_instance(class));
    if has_message_field && !message.is_empty() {
        let message = vm.new_string(message)?;
        vm.heap()
            .get(throwable)
            .set_ref_var("detailMessage", "Ljava/lang/String;", Some(message))?;
    }
    Ok(throwable)
}

/// Searches the frames above `stop_depth` for a handler of `err`, popping those that have
/// none. `Ok` means a handler now has control; otherwise the thrown object escapes as
/// [`Exception::UserException`]. Fatal errors pass through untouched.
pub(crate) fn handle_exception(
    vm: &Vm,
    thread: &mut Thread,
    stop_depth: usize,
    err: Exception,
) -> NativeResult<()> {
    let throwable = match err {
        Exception::Fatal(_) => return Err(err),
        Exception::UserException(throwable) => throwable,
        Exception::VmException {
            class_name,
            message,
        } => match materialize(vm, class_name, &message) {
            Ok(throwable) => throwable,
            Err(cause) => {
                log::debug!("cannot materialize {class_name}: {cause:?}");
                return Err(VmError::UncaughtException(UncaughtException {
                    thread_name: vm.options().main_thread_name.clone(),
                    class_name: class_name.replace('/', "."),
                    message: (!message.is_empty()).then_some(message),
                    stack_trace: capture_stack_trace(vm, thread, 0),
                })
                .into());
            }
        },
    };

    let object = vm.heap().get(throwable);
    if !object.has_stack_trace() {
        let trace = capture_stack_trace(vm, thread, 0);
        object.set_extra(Extra::StackTrace(trace.into()));
    }
    let thrown_class = object.class();

    while thread.depth() > stop_depth {
        let Some(frame) = thread.top_frame_mut() else {
            break;
        };
        if let Some(handler_pc) = find_handler(vm, frame, thrown_class) {
            frame.operand_stack.clear();
            frame.operand_stack.push_reference(Some(throwable));
            frame.next_pc = handler_pc;
            return Ok(());
        }
        if let Some(frame) = thread.pop_frame() {
            log::debug!(
                "unwind {}.{}{} for {}",
                frame.method.class().class_name,
                frame.method.name,
                frame.method.descriptor,
                thrown_class.class_name
            );
        }
    }
    Err(Exception::UserException(throwable))
}

/// First exception table entry covering the frame's pc whose catch type is absent, the thrown
/// class, or one of its superclasses.
fn find_handler(vm: &Vm, frame: &Frame, thrown_class: &Arc<Class>) -> Option<usize> {
    let method = &frame.method;
    if method.exception_table.is_empty() {
        return None;
    }
    let class = method.class();
    let pc = frame.pc;
    method
        .exception_table
        .iter()
        .filter(|handler| handler.start_pc <= pc && pc < handler.end_pc)
        .find(|handler| {
            let Some(catch_type) = handler.catch_type else {
                return true;
            };
            let catch_class = class
                .constant_pool
                .class_ref(catch_type)
                .and_then(|class_ref| class_ref.resolved_class(vm, &class));
            match catch_class {
                Ok(catch_class) => {
                    Arc::ptr_eq(&catch_class, thrown_class)
                        || thrown_class.is_subclass_of(&catch_class)
                }
                Err(err) => {
                    log::warn!(
                        "skipping handler at {} in {}.{}: cannot resolve catch type #{catch_type}: {err:?}",
                        handler.handler_pc,
                        class.class_name,
                        method.name
                    );
                    false
                }
            }
        })
        .map(|handler| handler.handler_pc)
}
