use crate::aggregate::Aggregate;
use crate::error::{AggrError, AggrResult};
use arrow_array::{ArrayRef, Float64Array};
use arrow_schema::{DataType, Field, Schema};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::sync::Arc;
use tether_columnar::compute::{add, divide, multiply, sqrt, subtract};
use tether_columnar::{ChunkedColumn, Table};

impl Aggregate {
    /// Per-row two-sample t-statistic between `self` and `other`.
    ///
    /// Rows with zero pooled variance yield `NaN` (equal means) or `±inf`, as does
    /// a pair of single-observation aggregates.
    pub fn compute_tstat_with(&self, other: &Aggregate) -> AggrResult<Table> {
        let t = self.t_statistics(other)?;
        let schema = Arc::new(Schema::new(vec![Field::new(
            "t_statistic",
            DataType::Float64,
            true,
        )]));
        Ok(Table::try_new(schema, vec![t])?)
    }

    /// Like [`Aggregate::compute_tstat_with`], adding a two-sided p-value column
    /// from Student's t with `count + other.count - 2` degrees of freedom.
    pub fn t_test_with(&self, other: &Aggregate) -> AggrResult<Table> {
        let t = self.t_statistics(other)?;
        let df = (self.count() + other.count()) as f64 - 2.0;
        let dist = StudentsT::new(0.0, 1.0, df).ok();
        if dist.is_none() {
            log::warn!("t-test with {df} degrees of freedom; p-values are NaN");
        }

        let p_values: Float64Array = t
            .iter_f64()?
            .map(|t| t.map(|t| two_sided_p(dist.as_ref(), t)))
            .collect();

        let schema = Arc::new(Schema::new(vec![
            Field::new("t_statistic", DataType::Float64, true),
            Field::new("p_value", DataType::Float64, true),
        ]));
        let p_values = ChunkedColumn::from_array(Arc::new(p_values) as ArrayRef);
        Ok(Table::try_new(schema, vec![t, p_values])?)
    }

    fn t_statistics(&self, other: &Aggregate) -> AggrResult<ChunkedColumn> {
        let ours = self.initialized()?;
        let theirs = other.initialized()?;
        if ours.means.len() != theirs.means.len() {
            return Err(AggrError::LengthMismatch {
                expected: ours.means.len(),
                actual: theirs.means.len(),
            });
        }

        let (n_a, n_b) = (self.count() as f64, other.count() as f64);
        let se = (1.0 / n_a + 1.0 / n_b).sqrt();

        let var_a = multiply(&divide(&ours.m2, n_a)?, n_a - 1.0)?;
        let var_b = multiply(&divide(&theirs.m2, n_b)?, n_b - 1.0)?;
        let pooled = divide(&add(&var_a, &var_b)?, n_a + n_b - 2.0)?;
        let denom = multiply(&sqrt(&pooled)?, se)?;

        Ok(divide(&subtract(&ours.means, &theirs.means)?, &denom)?)
    }
}

fn two_sided_p(dist: Option<&StudentsT>, t: f64) -> f64 {
    match dist {
        Some(dist) if !t.is_nan() => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        _ => f64::NAN,
    }
}
