use std::fmt::{Display, Formatter};

use asdf_error::{AsdfResult, asdf_bail};

use crate::{Transform, TransformRef};

/// How a [`CompoundModel`](crate::CompoundModel) combines its two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    /// Feed the left outputs into the right inputs.
    Compose,
    /// Split the inputs between both sides and join their outputs.
    Concatenate,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Power,
        Self::Compose,
        Self::Concatenate,
    ];

    /// The transform name the operator is tagged with.
    pub fn tag_name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Power => "power",
            Self::Compose => "compose",
            Self::Concatenate => "concatenate",
        }
    }

    pub fn from_tag_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.tag_name() == name)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Power => "**",
            Self::Compose => "|",
            Self::Concatenate => "&",
        }
    }

    fn is_arithmetic(self) -> bool {
        !matches!(self, Self::Compose | Self::Concatenate)
    }

    /// Input and output counts of `left <op> right`, or an error if the operands do not fit.
    pub fn arity(self, left: &dyn Transform, right: &dyn Transform) -> AsdfResult<(usize, usize)> {
        match self {
            Self::Compose => {
                if left.n_outputs() != right.n_inputs() {
                    asdf_bail!(
                        "cannot compose a transform with {} outputs into one with {} inputs",
                        left.n_outputs(),
                        right.n_inputs()
                    );
                }
                Ok((left.n_inputs(), right.n_outputs()))
            }
            Self::Concatenate => Ok((
                left.n_inputs() + right.n_inputs(),
                left.n_outputs() + right.n_outputs(),
            )),
            _ => {
                if (left.n_inputs(), left.n_outputs()) != (right.n_inputs(), right.n_outputs()) {
                    asdf_bail!(
                        "operands of '{}' disagree: {} -> {} against {} -> {}",
                        self,
                        left.n_inputs(),
                        left.n_outputs(),
                        right.n_inputs(),
                        right.n_outputs()
                    );
                }
                Ok((left.n_inputs(), left.n_outputs()))
            }
        }
    }

    /// Evaluate `left <op> right`. Operand arity has been checked by [`Self::arity`].
    pub(crate) fn evaluate(
        self,
        left: &TransformRef,
        right: &TransformRef,
        inputs: &[f64],
    ) -> Vec<f64> {
        match self {
            Self::Compose => right.unchecked_evaluate(&left.unchecked_evaluate(inputs)),
            Self::Concatenate => {
                let (l, r) = inputs.split_at(left.n_inputs());
                let mut outputs = left.unchecked_evaluate(l);
                outputs.extend(right.unchecked_evaluate(r));
                outputs
            }
            op => {
                debug_assert!(op.is_arithmetic());
                left.unchecked_evaluate(inputs)
                    .into_iter()
                    .zip(right.unchecked_evaluate(inputs))
                    .map(|(a, b)| match op {
                        Self::Add => a + b,
                        Self::Subtract => a - b,
                        Self::Multiply => a * b,
                        Self::Divide => a / b,
                        _ => a.powf(b),
                    })
                    .collect()
            }
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_tag_name(op.tag_name()), Some(op));
        }
        assert_eq!(Operator::from_tag_name("shift"), None);
    }
}
