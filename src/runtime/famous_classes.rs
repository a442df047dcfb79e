//! Internal names of the classes the runtime itself refers to.

pub(crate) const OBJECT: &str = "java/lang/Object";
pub(crate) const STRING: &str = "java/lang/String";
pub(crate) const CLASS: &str = "java/lang/Class";
pub(crate) const CLONEABLE: &str = "java/lang/Cloneable";
pub(crate) const SERIALIZABLE: &str = "java/io/Serializable";
pub(crate) const THROWABLE: &str = "java/lang/Throwable";
pub(crate) const FIELD: &str = "java/lang/reflect/Field";

pub(crate) const CLASS_NOT_FOUND_EXCEPTION: &str = "java/lang/ClassNotFoundException";
pub(crate) const NO_SUCH_FIELD_ERROR: &str = "java/lang/NoSuchFieldError";
pub(crate) const NO_SUCH_METHOD_ERROR: &str = "java/lang/NoSuchMethodError";
pub(crate) const ILLEGAL_ACCESS_ERROR: &str = "java/lang/IllegalAccessError";
pub(crate) const INCOMPATIBLE_CLASS_CHANGE_ERROR: &str = "java/lang/IncompatibleClassChangeError";
pub(crate) const INSTANTIATION_ERROR: &str = "java/lang/InstantiationError";
pub(crate) const ABSTRACT_METHOD_ERROR: &str = "java/lang/AbstractMethodError";
pub(crate) const NULL_POINTER_EXCEPTION: &str = "java/lang/NullPointerException";
pub(crate) const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "java/lang/NegativeArraySizeException";
pub(crate) const ARRAY_STORE_EXCEPTION: &str = "java/lang/ArrayStoreException";
pub(crate) const ARRAY_INDEX_OUT_OF_BOUNDS_EXCEPTION: &str =
    "java/lang/ArrayIndexOutOfBoundsException";
pub(crate) const INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "java/lang/IndexOutOfBoundsException";
pub(crate) const CLASS_CAST_EXCEPTION: &str = "java/lang/ClassCastException";
pub(crate) const UNSATISFIED_LINK_ERROR: &str = "java/lang/UnsatisfiedLinkError";
pub(crate) const ARITHMETIC_EXCEPTION: &str = "java/lang/ArithmeticException";
pub(crate) const CLASS_FORMAT_ERROR: &str = "java/lang/ClassFormatError";
pub(crate) const CLASS_CIRCULARITY_ERROR: &str = "java/lang/ClassCircularityError";
pub(crate) const NO_CLASS_DEF_FOUND_ERROR: &str = "java/lang/NoClassDefFoundError";
pub(crate) const CLONE_NOT_SUPPORTED_EXCEPTION: &str = "java/lang/CloneNotSupportedException";
