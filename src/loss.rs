use crate::engine::Value;
use crate::error::{Error, Result};

/// Sum of squared differences, `Σ (target - prediction)²`.
///
/// Not divided by the number of samples.
pub fn squared_error<'g>(targets: &[Value<'g>], predictions: &[Value<'g>]) -> Result<Value<'g>> {
    if targets.len() != predictions.len() {
        return Err(Error::ShapeMismatch {
            operation: "squared_error",
            expected: targets.len(),
            actual: predictions.len(),
        });
    }

    targets
        .iter()
        .zip(predictions)
        .map(|(&y, &y_hat)| {
            let diff = y - y_hat;
            diff * diff
        })
        .reduce(|acc, term| acc + term)
        .ok_or(Error::EmptyInput {
            operation: "squared_error",
        })
}
