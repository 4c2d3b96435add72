//! Call arguments and their binding to parameters.

use std::collections::HashMap;

use super::param::Param;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Positional and keyword arguments for one call.
#[derive(Debug, Clone, Default)]
pub struct Args {
    positional: Vec<Tensor>,
    keyword: Vec<(String, Tensor)>,
}

impl Args {
    pub fn new() -> Self {
        Args::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Tensor>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Adds a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Tensor>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    pub fn positional(values: impl IntoIterator<Item = Tensor>) -> Self {
        Args {
            positional: values.into_iter().collect(),
            keyword: Vec::new(),
        }
    }

    /// Resolves one value per parameter, in parameter order, already filtered to its type.
    pub(crate) fn bind(self, params: &[Param], keywords: &HashMap<String, usize>) -> Result<Vec<Tensor>> {
        if self.positional.len() > params.len() {
            return Err(Error::TooManyArguments {
                expected: params.len(),
                given: self.positional.len(),
            });
        }

        let mut slots: Vec<Option<Tensor>> = vec![None; params.len()];
        for (slot, value) in slots.iter_mut().zip(self.positional) {
            *slot = Some(value);
        }
        for (name, value) in self.keyword {
            let Some(&index) = keywords.get(&name) else {
                return Err(Error::UnknownParameter { name });
            };
            if slots[index].is_some() {
                return Err(Error::DuplicateArgument { name });
            }
            slots[index] = Some(value);
        }

        params
            .iter()
            .zip(slots)
            .map(|(param, slot)| match slot {
                Some(value) => param.filter(value),
                None => param
                    .default
                    .clone()
                    .ok_or_else(|| Error::MissingArgument { name: param.label() }),
            })
            .collect()
    }
}

impl From<Vec<Tensor>> for Args {
    fn from(values: Vec<Tensor>) -> Self {
        Args::positional(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::param::In;
    use crate::graph::dscalars;

    fn setup() -> Result<(Vec<Param>, HashMap<String, usize>)> {
        let [x, y, w] = dscalars(["x", "y", "w"]);
        let params = vec![
            Param::from_spec(In::from(&x))?,
            Param::from_spec(In::new(&y).default(1.0))?,
            Param::from_spec(In::new(&w).default(2.0).name("w_by_name"))?,
        ];
        let keywords = params
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.binding.clone().map(|name| (name, i)))
            .collect();
        Ok((params, keywords))
    }

    fn values(bound: &[Tensor]) -> Vec<f64> {
        bound.iter().filter_map(Tensor::item_f64).collect()
    }

    #[test]
    fn positional_keyword_and_default_binding() -> Result<()> {
        let (params, keywords) = setup()?;
        let bound = Args::new().arg(33).bind(&params, &keywords)?;
        assert_eq!(values(&bound), vec![33.0, 1.0, 2.0]);

        let bound = Args::new()
            .arg(33)
            .kwarg("w_by_name", 1)
            .kwarg("y", 0)
            .bind(&params, &keywords)?;
        assert_eq!(values(&bound), vec![33.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn binding_errors() -> Result<()> {
        let (params, keywords) = setup()?;
        let err = Args::new().bind(&params, &keywords).unwrap_err();
        assert!(matches!(err, Error::MissingArgument { ref name } if name == "x"));

        let err = Args::new()
            .arg(1)
            .kwarg("w", 2)
            .bind(&params, &keywords)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownParameter { ref name } if name == "w"));

        let err = Args::new()
            .arg(1)
            .arg(2)
            .kwarg("y", 3)
            .bind(&params, &keywords)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateArgument { ref name } if name == "y"));

        let err = Args::positional(vec![Tensor::from(1.0); 4])
            .bind(&params, &keywords)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TooManyArguments {
                expected: 3,
                given: 4
            }
        ));
        Ok(())
    }
}
