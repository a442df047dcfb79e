pub mod class;
pub mod classpath;
pub mod consts;
pub mod descriptor;
pub mod runtime;
