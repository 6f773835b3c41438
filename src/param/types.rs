//! Parameter type tags and the tagged value carried by every entry.

use std::any::Any;
use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::config::InterfaceMask;
use crate::error::{DriverError, DriverResult};

/// Maximum number of states an enum parameter can describe.
pub const MAX_ENUM_STATES: usize = 16;

/// Data type of a parameter. Immutable once the parameter is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamType {
    Int32,
    Int64,
    UInt32Digital,
    Float64,
    Octet,
    Int8Array,
    Int16Array,
    Int32Array,
    Int64Array,
    Float32Array,
    Float64Array,
    GenericPointer,
    Enum,
}

impl ParamType {
    /// Every type, in declaration order.
    pub const ALL: [ParamType; 13] = [
        ParamType::Int32,
        ParamType::Int64,
        ParamType::UInt32Digital,
        ParamType::Float64,
        ParamType::Octet,
        ParamType::Int8Array,
        ParamType::Int16Array,
        ParamType::Int32Array,
        ParamType::Int64Array,
        ParamType::Float32Array,
        ParamType::Float64Array,
        ParamType::GenericPointer,
        ParamType::Enum,
    ];

    /// Interface name as shown in reports and error messages.
    pub const fn name(self) -> &'static str {
        match self {
            ParamType::Int32 => "Int32",
            ParamType::Int64 => "Int64",
            ParamType::UInt32Digital => "UInt32Digital",
            ParamType::Float64 => "Float64",
            ParamType::Octet => "Octet",
            ParamType::Int8Array => "Int8Array",
            ParamType::Int16Array => "Int16Array",
            ParamType::Int32Array => "Int32Array",
            ParamType::Int64Array => "Int64Array",
            ParamType::Float32Array => "Float32Array",
            ParamType::Float64Array => "Float64Array",
            ParamType::GenericPointer => "GenericPointer",
            ParamType::Enum => "Enum",
        }
    }

    /// The interface bit a port must advertise to serve this type.
    pub const fn interface(self) -> InterfaceMask {
        match self {
            ParamType::Int32 => InterfaceMask::INT32,
            ParamType::Int64 => InterfaceMask::INT64,
            ParamType::UInt32Digital => InterfaceMask::UINT32_DIGITAL,
            ParamType::Float64 => InterfaceMask::FLOAT64,
            ParamType::Octet => InterfaceMask::OCTET,
            ParamType::Int8Array => InterfaceMask::INT8_ARRAY,
            ParamType::Int16Array => InterfaceMask::INT16_ARRAY,
            ParamType::Int32Array => InterfaceMask::INT32_ARRAY,
            ParamType::Int64Array => InterfaceMask::INT64_ARRAY,
            ParamType::Float32Array => InterfaceMask::FLOAT32_ARRAY,
            ParamType::Float64Array => InterfaceMask::FLOAT64_ARRAY,
            ParamType::GenericPointer => InterfaceMask::GENERIC_POINTER,
            ParamType::Enum => InterfaceMask::ENUM,
        }
    }

    /// Returns `true` for the array types.
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            ParamType::Int8Array
                | ParamType::Int16Array
                | ParamType::Int32Array
                | ParamType::Int64Array
                | ParamType::Float32Array
                | ParamType::Float64Array
        )
    }
}

impl core::fmt::Display for ParamType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque shared object carried by `GenericPointer` parameters.
///
/// Equality is identity: two pointers are equal only if they share the same
/// allocation, so re-setting the same object is not a change.
#[derive(Clone)]
pub struct GenericPointer(Arc<dyn Any + Send + Sync>);

impl GenericPointer {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn from_arc(inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self(inner)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for GenericPointer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl core::fmt::Debug for GenericPointer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "GenericPointer({:p})", Arc::as_ptr(&self.0))
    }
}

/// One state of an enum parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumChoice {
    pub label: String,
    pub value: i32,
    pub severity: i32,
}

impl EnumChoice {
    pub fn new(label: impl Into<String>, value: i32, severity: i32) -> Self {
        Self {
            label: label.into(),
            value,
            severity,
        }
    }
}

/// The state set of an enum parameter, bounded to [`MAX_ENUM_STATES`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumChoices(ArrayVec<EnumChoice, MAX_ENUM_STATES>);

impl EnumChoices {
    pub fn new() -> Self {
        Self(ArrayVec::new())
    }

    /// Appends a state.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::ArrayTooLarge`] when the set is already full.
    pub fn push(&mut self, choice: EnumChoice) -> DriverResult {
        self.0.try_push(choice).map_err(|_| DriverError::ArrayTooLarge {
            len: MAX_ENUM_STATES + 1,
            capacity: MAX_ENUM_STATES,
        })
    }

    /// Builds a state set from an iterator, failing if it holds too many states.
    pub fn try_from_iter<I>(iter: I) -> DriverResult<Self>
    where
        I: IntoIterator<Item = EnumChoice>,
    {
        let mut choices = Self::new();
        for choice in iter {
            choices.push(choice)?;
        }
        Ok(choices)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnumChoice> {
        self.0.iter()
    }

    /// Looks a state up by its numeric value.
    pub fn by_value(&self, value: i32) -> Option<&EnumChoice> {
        self.0.iter().find(|c| c.value == value)
    }
}

/// Which transitions of a digital bit raise an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalReason {
    ZeroToOne,
    OneToZero,
    Both,
}

/// Value of a parameter, tagged with its type.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int32(i32),
    Int64(i64),
    UInt32Digital(u32),
    Float64(f64),
    Octet(String),
    Int8Array(Vec<i8>),
    Int16Array(Vec<i16>),
    Int32Array(Vec<i32>),
    Int64Array(Vec<i64>),
    Float32Array(Vec<f32>),
    Float64Array(Vec<f64>),
    GenericPointer(GenericPointer),
    Enum(EnumChoices),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Int32(_) => ParamType::Int32,
            ParamValue::Int64(_) => ParamType::Int64,
            ParamValue::UInt32Digital(_) => ParamType::UInt32Digital,
            ParamValue::Float64(_) => ParamType::Float64,
            ParamValue::Octet(_) => ParamType::Octet,
            ParamValue::Int8Array(_) => ParamType::Int8Array,
            ParamValue::Int16Array(_) => ParamType::Int16Array,
            ParamValue::Int32Array(_) => ParamType::Int32Array,
            ParamValue::Int64Array(_) => ParamType::Int64Array,
            ParamValue::Float32Array(_) => ParamType::Float32Array,
            ParamValue::Float64Array(_) => ParamType::Float64Array,
            ParamValue::GenericPointer(_) => ParamType::GenericPointer,
            ParamValue::Enum(_) => ParamType::Enum,
        }
    }

    /// Element count for arrays and enum state sets, `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            ParamValue::Int8Array(v) => Some(v.len()),
            ParamValue::Int16Array(v) => Some(v.len()),
            ParamValue::Int32Array(v) => Some(v.len()),
            ParamValue::Int64Array(v) => Some(v.len()),
            ParamValue::Float32Array(v) => Some(v.len()),
            ParamValue::Float64Array(v) => Some(v.len()),
            ParamValue::Enum(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Converts into a concrete Rust type.
    pub fn get<T: ParamKind>(&self) -> Option<T> {
        T::from_value(self)
    }
}

impl core::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParamValue::Int32(v) => write!(f, "{v}"),
            ParamValue::Int64(v) => write!(f, "{v}"),
            ParamValue::UInt32Digital(v) => write!(f, "{v:#010x}"),
            ParamValue::Float64(v) => write!(f, "{v}"),
            ParamValue::Octet(v) => write!(f, "{v:?}"),
            ParamValue::GenericPointer(p) => write!(f, "{p:?}"),
            ParamValue::Enum(choices) => {
                let labels: Vec<&str> = choices.iter().map(|c| c.label.as_str()).collect();
                write!(f, "{labels:?}")
            }
            other => write!(f, "[{} elements]", other.len().unwrap_or(0)),
        }
    }
}

/// Rust types that map onto exactly one [`ParamType`].
///
/// Implemented for the scalar, string, array, pointer and enum types so the
/// core can offer one generic get/set pair instead of a method per type.
pub trait ParamKind: Sized {
    const TYPE: ParamType;

    fn into_value(self) -> ParamValue;

    fn from_value(value: &ParamValue) -> Option<Self>;
}

macro_rules! impl_param_kind {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ParamKind for $ty {
                const TYPE: ParamType = ParamType::$variant;

                #[inline]
                fn into_value(self) -> ParamValue {
                    ParamValue::$variant(self)
                }

                #[inline]
                fn from_value(value: &ParamValue) -> Option<Self> {
                    match value {
                        ParamValue::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_param_kind! {
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32Digital,
    f64 => Float64,
    String => Octet,
    Vec<i8> => Int8Array,
    Vec<i16> => Int16Array,
    Vec<i32> => Int32Array,
    Vec<i64> => Int64Array,
    Vec<f32> => Float32Array,
    Vec<f64> => Float64Array,
    GenericPointer => GenericPointer,
    EnumChoices => Enum,
}
