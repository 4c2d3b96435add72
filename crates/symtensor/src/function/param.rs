//! Input specifications: which variable an argument binds to, and how.

use crate::error::{Error, Result};
use crate::graph::Node;
use crate::tensor::{Tensor, TensorType};

/// Declares one function parameter.
///
/// ```ignore
/// let f = FunctionBuilder::new([In::from(&x), In::new(&y).default(1.0)], &out).build(backend)?;
/// ```
#[derive(Debug, Clone)]
pub struct In {
    pub(crate) variable: Node,
    pub(crate) default: Option<Tensor>,
    pub(crate) name: Option<String>,
    pub(crate) strict: bool,
}

impl In {
    pub fn new(variable: &Node) -> Self {
        In {
            variable: variable.clone(),
            default: None,
            name: None,
            strict: false,
        }
    }

    /// Value used when the caller supplies none.
    pub fn default(mut self, value: impl Into<Tensor>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Keyword under which the argument is bound, replacing the variable's own name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Rejects any argument whose dtype differs from the variable's instead of converting it.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl From<&Node> for In {
    fn from(variable: &Node) -> Self {
        In::new(variable)
    }
}

impl From<Node> for In {
    fn from(variable: Node) -> Self {
        In::new(&variable)
    }
}

/// A validated parameter of a compiled function.
#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub(crate) variable: Node,
    /// Keyword name; `None` when neither the input nor the variable carries a name.
    pub(crate) binding: Option<String>,
    pub(crate) default: Option<Tensor>,
    pub(crate) strict: bool,
}

impl Param {
    pub(crate) fn from_spec(spec: In) -> Result<Self> {
        if !spec.variable.is_variable() {
            return Err(Error::Configuration(format!(
                "input `{}` is not a symbolic variable",
                spec.variable.display_name()
            )));
        }
        let binding = spec
            .name
            .or_else(|| spec.variable.name().map(str::to_string));
        let mut param = Param {
            variable: spec.variable,
            binding,
            default: None,
            strict: spec.strict,
        };
        if let Some(value) = spec.default {
            param.default = Some(param.filter(value)?);
        }
        Ok(param)
    }

    pub(crate) fn ty(&self) -> TensorType {
        self.variable.ty()
    }

    pub(crate) fn label(&self) -> String {
        self.binding
            .clone()
            .unwrap_or_else(|| self.variable.display_name())
    }

    /// Converts an argument to the parameter's type.
    pub(crate) fn filter(&self, value: Tensor) -> Result<Tensor> {
        self.ty()
            .filter(value, self.strict, &format!("argument `{}`", self.label()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{dscalar, iscalar};
    use crate::tensor::DType;

    #[test]
    fn binding_prefers_override_name() -> Result<()> {
        let w = dscalar("w");
        let param = Param::from_spec(In::new(&w).default(2.0).name("w_by_name"))?;
        assert_eq!(param.binding.as_deref(), Some("w_by_name"));
        assert_eq!(param.default.as_ref().and_then(Tensor::item_f64), Some(2.0));

        let plain = Param::from_spec(In::from(&w))?;
        assert_eq!(plain.binding.as_deref(), Some("w"));
        Ok(())
    }

    #[test]
    fn defaults_are_converted_to_the_variable_type() -> Result<()> {
        let x = dscalar("x");
        let param = Param::from_spec(In::new(&x).default(3i64))?;
        assert_eq!(param.default.map(|v| v.dtype()), Some(DType::F64));

        let n = iscalar("n");
        let err = Param::from_spec(In::new(&n).default(0.5)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        Ok(())
    }

    #[test]
    fn non_variables_are_rejected() {
        let x = dscalar("x");
        let err = Param::from_spec(In::from(&x * 2.0)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
