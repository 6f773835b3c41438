//! Parameter sets declared ahead of port construction.

use super::types::ParamType;

/// A parameter declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    pub name: String,
    pub ty: ParamType,
}

/// An ordered list of parameter declarations.
///
/// Drivers that share a parameter layout describe it once and hand it to
/// [`DriverCore::create_params`](crate::DriverCore::create_params), which
/// declares every entry in every list and returns the indices in order.
///
/// ```rust,ignore
/// let set = ParamSet::new()
///     .with("Temperature", ParamType::Float64)
///     .with("Setpoint", ParamType::Float64)
///     .with("Model", ParamType::Octet);
/// let indices = core.create_params(&set)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    defs: Vec<ParamDef>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a declaration.
    pub fn with(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.defs.push(ParamDef {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamDef> {
        self.defs.iter()
    }
}

impl FromIterator<(String, ParamType)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamType)>>(iter: I) -> Self {
        Self {
            defs: iter
                .into_iter()
                .map(|(name, ty)| ParamDef { name, ty })
                .collect(),
        }
    }
}
