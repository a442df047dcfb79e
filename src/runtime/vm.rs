use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{
    class::{ClassFileParser, ClassParser},
    classpath::ClassPathEntry,
    consts::{ACC_PUBLIC, ACC_STATIC, ClassAccessFlag},
    descriptor::parse_method_descriptor,
    runtime::{
        ArrayData, Class, ClassMember, Exception, Heap, Method, NativeMethod, NativeRegistry,
        NativeResult, Object, Reference, Slot, UncaughtException, VmError,
        class_loader::{BootstrapClassLoader, initialize_class},
        heap::{reflection, string_table::{self, StringTable}},
        interpreter::{self, Frame, Thread, instructions as inst},
        native,
    },
};

const SHIM_CLASS: &str = "~shim";
const SHIM_METHOD: &str = "<return>";

#[derive(Debug, Clone)]
pub struct VmOptions {
    pub max_stack_depth: usize,
    /// log every loaded class at info level
    pub verbose_class: bool,
    /// log every executed instruction at trace level
    pub verbose_inst: bool,
    pub main_thread_name: String,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_stack_depth: 1024,
            verbose_class: false,
            verbose_inst: false,
            main_thread_name: "main".to_string(),
        }
    }
}

/// The runtime context: class loader, heap, string pool and native table. Every operation
/// that runs bytecode takes a `&Vm`.
#[derive(Debug)]
pub struct Vm {
    options: VmOptions,
    loader: BootstrapClassLoader,
    heap: Heap,
    string_table: StringTable,
    natives: NativeRegistry,
    shim_class: Arc<Class>,
    resolutions: AtomicUsize,
    started: Instant,
}

impl Vm {
    pub fn new(options: VmOptions, class_path: Box<dyn ClassPathEntry>) -> Self {
        Self::with_parser(options, class_path, Box::new(ClassFileParser))
    }

    pub fn with_parser(
        options: VmOptions,
        class_path: Box<dyn ClassPathEntry>,
        parser: Box<dyn ClassParser>,
    ) -> Self {
        let vm = Self {
            options,
            loader: BootstrapClassLoader::new(class_path, parser),
            heap: Heap::new(),
            string_table: StringTable::new(),
            natives: NativeRegistry::default(),
            shim_class: shim_class(),
            resolutions: AtomicUsize::new(0),
            started: Instant::now(),
        };
        native::register_natives(&vm);
        vm
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Accepts internal names, array descriptors such as `[I`, and primitive type names.
    pub fn load_class(&self, class_name: &str) -> NativeResult<Arc<Class>> {
        self.loader.load_class(self, class_name)
    }

    pub fn register_native(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        method: NativeMethod,
    ) {
        self.natives.register(class_name, name, descriptor, method);
    }

    pub(crate) fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub(crate) fn count_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since this VM was created; the base of `System.nanoTime`.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Number of symbolic references resolved so far.
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn intern_string(&self, value: &str) -> NativeResult<Reference> {
        self.string_table.intern(self, value)
    }

    pub(crate) fn intern_string_object(&self, string: Reference) -> NativeResult<Reference> {
        self.string_table.intern_object(self, string)
    }

    /// A fresh string object, not interned.
    pub fn new_string(&self, value: &str) -> NativeResult<Reference> {
        string_table::new_string(self, value)
    }

    pub fn rust_string(&self, string: Reference) -> String {
        string_table::rust_string(self, string).unwrap_or_else(|err| {
            log::warn!("cannot decode string object: {err:?}");
            String::new()
        })
    }

    pub fn class_object(&self, class: &Arc<Class>) -> NativeResult<Reference> {
        reflection::class_object(self, class)
    }

    pub fn new_thread(&self) -> Thread {
        Thread::new(self.options.max_stack_depth)
    }

    pub(crate) fn shim_method(&self) -> &Arc<Method> {
        &self.shim_class.methods[0]
    }

    pub(crate) fn is_shim(&self, method: &Method) -> bool {
        method.is_declared_by(&self.shim_class)
    }

    /// A shim frame whose operand stack already holds `slots`. Invoking a method from it
    /// takes the arguments off that stack.
    pub(crate) fn shim_frame(&self, slots: &[Slot]) -> Frame {
        let mut frame = Frame::new(Arc::clone(self.shim_method()));
        for slot in slots {
            frame.operand_stack.push_slot(*slot);
        }
        frame
    }

    /// Calls `method` with `args` and runs it to completion. Returns the slots it left on the
    /// shim frame's stack: nothing for `void`, one or two slots otherwise.
    ///
    /// On error the thread is cut back to the depth it had on entry.
    pub fn invoke(
        &self,
        thread: &mut Thread,
        method: &Arc<Method>,
        args: &[Slot],
    ) -> NativeResult<Vec<Slot>> {
        let base = thread.depth();
        let result = self.invoke_at(thread, method, args, base);
        if result.is_err() {
            thread.truncate(base);
        }
        result
    }

    fn invoke_at(
        &self,
        thread: &mut Thread,
        method: &Arc<Method>,
        args: &[Slot],
        base: usize,
    ) -> NativeResult<Vec<Slot>> {
        // runs before the target frame exists, so its handlers cannot catch an init failure
        if method.is_static() {
            self.ensure_initialized(thread, &method.class())?;
        }
        thread.push_frame(self.shim_frame(args))?;
        thread.invoke_method(Arc::clone(method))?;
        interpreter::execute(self, thread, base + 1)?;
        let mut shim = thread.pop_frame().expect("shim frame is on top");
        Ok(shim.operand_stack.take_slots())
    }

    /// Runs the static initializers of `class` and its superclasses, if not started yet.
    pub(crate) fn ensure_initialized(
        &self,
        thread: &mut Thread,
        class: &Arc<Class>,
    ) -> NativeResult<()> {
        if class.init_started() {
            return Ok(());
        }
        let base = thread.depth();
        let result = thread
            .push_frame(self.shim_frame(&[]))
            .and_then(|()| initialize_class(thread, class))
            .and_then(|()| interpreter::execute(self, thread, base + 1));
        thread.truncate(base);
        result
    }

    /// Loads `class_name` (dots allowed), then runs its `public static void main(String[])`.
    pub fn run_main(&self, class_name: &str, args: &[String]) -> Result<(), VmError> {
        let mut thread = self.new_thread();
        let result = self.start_main(&mut thread, &class_name.replace('.', "/"), args);
        thread.truncate(0);
        result.map_err(|err| self.into_vm_error(err))
    }

    fn start_main(
        &self,
        thread: &mut Thread,
        class_name: &str,
        args: &[String],
    ) -> NativeResult<()> {
        let class = self.load_class(class_name)?;
        let main = class
            .main_method()
            .cloned()
            .ok_or_else(|| VmError::MainMethodNotFound(class.java_name()))?;

        let strings = args
            .iter()
            .map(|arg| self.new_string(arg).map(Some))
            .collect::<NativeResult<Vec<_>>>()?;
        let array_class = self.load_class("[Ljava/lang/String;")?;
        let array = self.heap.allocate(Object::new_array(
            array_class,
            ArrayData::References(strings),
        ));

        self.invoke(thread, &main, &[Slot::from_reference(Some(array))])?;
        Ok(())
    }

    fn into_vm_error(&self, err: Exception) -> VmError {
        let thread_name = self.options.main_thread_name.clone();
        match err {
            Exception::Fatal(err) => err,
            Exception::UserException(throwable) => {
                let object = self.heap.get(throwable);
                let message = object
                    .get_ref_var("detailMessage", "Ljava/lang/String;")
                    .ok()
                    .flatten()
                    .map(|message| self.rust_string(message));
                VmError::UncaughtException(UncaughtException {
                    thread_name,
                    class_name: object.class().java_name(),
                    message,
                    stack_trace: object
                        .stack_trace()
                        .map(|trace| trace.to_vec())
                        .unwrap_or_default(),
                })
            }
            Exception::VmException {
                class_name,
                message,
            } => VmError::UncaughtException(UncaughtException {
                thread_name,
                class_name: class_name.replace('/', "."),
                message: (!message.is_empty()).then_some(message),
                stack_trace: vec![],
            }),
        }
    }
}

fn shim_class() -> Arc<Class> {
    Class::new_synthetic(
        SHIM_CLASS,
        ClassAccessFlag::PUBLIC | ClassAccessFlag::FINAL,
        None,
        vec![],
        None,
        |this| {
            let descriptor = "()V";
            let access_flags = ACC_PUBLIC | ACC_STATIC;
            let (_, parsed_descriptor) =
                parse_method_descriptor(descriptor).expect("valid shim descriptor");
            vec![Arc::new(Method {
                member: ClassMember {
                    access_flags,
                    name: Arc::from(SHIM_METHOD),
                    descriptor: Arc::from(descriptor),
                    class: this.clone(),
                },
                max_stack: 0,
                max_locals: 0,
                code: Arc::from([inst::RETURN]),
                exception_table: vec![],
                line_numbers: vec![],
                exceptions: vec![],
                arg_slot_count: 0,
                parsed_descriptor,
            })]
        },
    )
}
