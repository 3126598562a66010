//! Elementwise vectorized arithmetic over chunked columns.
//!
//! Every operation takes [`Datum`] operands (a column, a broadcast scalar, or an
//! absent value) and returns a newly allocated Float64 [`ChunkedColumn`]. An absent
//! operand makes the whole call fail with [`ColumnarError::NullOperand`], so a chain
//! of operations short-circuits on the first missing input via `?`.
//!
//! Column operands must have the same logical length but may be chunked differently;
//! the two chunk lists are aligned by zero-copy slicing before the Arrow kernels run.
//! Non-Float64 numeric inputs are cast to Float64 first. Floating point division by
//! zero produces `inf`/`NaN` rather than an error.

use crate::column::ChunkedColumn;
use crate::error::{ColumnarError, ColumnarResult};
use arrow_arith::numeric;
use arrow_array::cast::AsArray;
use arrow_array::types::Float64Type;
use arrow_array::{Array, ArrayRef, Datum as ArrowDatum, Float64Array};
use arrow_schema::{ArrowError, DataType};
use std::sync::Arc;

/// One operand of a compute call.
#[derive(Clone, Copy, Debug)]
pub enum Datum<'a> {
    Column(&'a ChunkedColumn),
    Scalar(f64),
    Null,
}

impl<'a> From<&'a ChunkedColumn> for Datum<'a> {
    fn from(column: &'a ChunkedColumn) -> Self {
        Datum::Column(column)
    }
}

impl<'a> From<Option<&'a ChunkedColumn>> for Datum<'a> {
    fn from(column: Option<&'a ChunkedColumn>) -> Self {
        column.map(Datum::Column).unwrap_or(Datum::Null)
    }
}

impl From<f64> for Datum<'_> {
    fn from(value: f64) -> Self {
        Datum::Scalar(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    fn apply(self, lhs: &dyn ArrowDatum, rhs: &dyn ArrowDatum) -> Result<ArrayRef, ArrowError> {
        match self {
            BinaryOp::Add => numeric::add(lhs, rhs),
            BinaryOp::Subtract => numeric::sub(lhs, rhs),
            BinaryOp::Multiply => numeric::mul(lhs, rhs),
            BinaryOp::Divide => numeric::div(lhs, rhs),
        }
    }

    fn scalar(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Subtract => lhs - rhs,
            BinaryOp::Multiply => lhs * rhs,
            BinaryOp::Divide => lhs / rhs,
        }
    }
}

pub fn add<'a>(lhs: impl Into<Datum<'a>>, rhs: impl Into<Datum<'a>>) -> ColumnarResult<ChunkedColumn> {
    binary(lhs.into(), rhs.into(), BinaryOp::Add)
}

pub fn subtract<'a>(
    lhs: impl Into<Datum<'a>>,
    rhs: impl Into<Datum<'a>>,
) -> ColumnarResult<ChunkedColumn> {
    binary(lhs.into(), rhs.into(), BinaryOp::Subtract)
}

pub fn multiply<'a>(
    lhs: impl Into<Datum<'a>>,
    rhs: impl Into<Datum<'a>>,
) -> ColumnarResult<ChunkedColumn> {
    binary(lhs.into(), rhs.into(), BinaryOp::Multiply)
}

pub fn divide<'a>(
    lhs: impl Into<Datum<'a>>,
    rhs: impl Into<Datum<'a>>,
) -> ColumnarResult<ChunkedColumn> {
    binary(lhs.into(), rhs.into(), BinaryOp::Divide)
}

/// `base ^ exponent`, elementwise. Either side may be a column or a scalar.
pub fn power<'a>(
    base: impl Into<Datum<'a>>,
    exponent: impl Into<Datum<'a>>,
) -> ColumnarResult<ChunkedColumn> {
    match (base.into(), exponent.into()) {
        (Datum::Null, _) | (_, Datum::Null) => Err(ColumnarError::NullOperand),
        (base, Datum::Scalar(e)) => map_f64(base, |v| v.powf(e)),
        (Datum::Scalar(b), exponent) => map_f64(exponent, |e| b.powf(e)),
        (Datum::Column(base), Datum::Column(exponent)) => {
            let chunks = aligned_chunks(base, exponent)?
                .into_iter()
                .map(|(b, e)| {
                    let b = b.as_primitive::<Float64Type>();
                    let e = e.as_primitive::<Float64Type>();
                    let out: Float64Array = arrow_arith::arity::binary(b, e, |b, e| b.powf(e))?;
                    Ok(Arc::new(out) as ArrayRef)
                })
                .collect::<ColumnarResult<Vec<_>>>()?;
            ChunkedColumn::try_new(DataType::Float64, chunks)
        }
    }
}

pub fn abs<'a>(operand: impl Into<Datum<'a>>) -> ColumnarResult<ChunkedColumn> {
    map_f64(operand.into(), f64::abs)
}

pub fn sqrt<'a>(operand: impl Into<Datum<'a>>) -> ColumnarResult<ChunkedColumn> {
    map_f64(operand.into(), f64::sqrt)
}

fn binary(lhs: Datum<'_>, rhs: Datum<'_>, op: BinaryOp) -> ColumnarResult<ChunkedColumn> {
    match (lhs, rhs) {
        (Datum::Null, _) | (_, Datum::Null) => Err(ColumnarError::NullOperand),
        (Datum::Scalar(l), Datum::Scalar(r)) => Ok(ChunkedColumn::from_f64(vec![op.scalar(l, r)])),
        (Datum::Column(l), Datum::Column(r)) => {
            let chunks = aligned_chunks(l, r)?
                .into_iter()
                .map(|(a, b)| op.apply(&a, &b))
                .collect::<Result<Vec<_>, _>>()?;
            ChunkedColumn::try_new(DataType::Float64, chunks)
        }
        (Datum::Column(l), Datum::Scalar(r)) => {
            let l = l.to_float64()?;
            let scalar = Float64Array::new_scalar(r);
            let chunks = l
                .chunks()
                .iter()
                .map(|chunk| op.apply(chunk, &scalar))
                .collect::<Result<Vec<_>, _>>()?;
            ChunkedColumn::try_new(DataType::Float64, chunks)
        }
        (Datum::Scalar(l), Datum::Column(r)) => {
            let r = r.to_float64()?;
            let scalar = Float64Array::new_scalar(l);
            let chunks = r
                .chunks()
                .iter()
                .map(|chunk| op.apply(&scalar, chunk))
                .collect::<Result<Vec<_>, _>>()?;
            ChunkedColumn::try_new(DataType::Float64, chunks)
        }
    }
}

fn map_f64(operand: Datum<'_>, f: impl Fn(f64) -> f64) -> ColumnarResult<ChunkedColumn> {
    match operand {
        Datum::Null => Err(ColumnarError::NullOperand),
        Datum::Scalar(v) => Ok(ChunkedColumn::from_f64(vec![f(v)])),
        Datum::Column(column) => {
            let column = column.to_float64()?;
            let chunks = column
                .chunks()
                .iter()
                .map(|chunk| {
                    let out: Float64Array = chunk.as_primitive::<Float64Type>().unary(&f);
                    Arc::new(out) as ArrayRef
                })
                .collect();
            ChunkedColumn::try_new(DataType::Float64, chunks)
        }
    }
}

/// Pair up two equal-length columns slice by slice, cutting at the union of
/// both chunk boundaries. Both sides are cast to Float64.
fn aligned_chunks(
    lhs: &ChunkedColumn,
    rhs: &ChunkedColumn,
) -> ColumnarResult<Vec<(ArrayRef, ArrayRef)>> {
    if lhs.len() != rhs.len() {
        return Err(ColumnarError::LengthMismatch {
            expected: lhs.len(),
            actual: rhs.len(),
        });
    }
    let lhs = lhs.to_float64()?;
    let rhs = rhs.to_float64()?;
    let (l_chunks, r_chunks) = (lhs.chunks(), rhs.chunks());

    let mut pairs = Vec::with_capacity(l_chunks.len().max(r_chunks.len()));
    let (mut li, mut lo) = (0usize, 0usize);
    let (mut ri, mut ro) = (0usize, 0usize);
    loop {
        while li < l_chunks.len() && lo == l_chunks[li].len() {
            li += 1;
            lo = 0;
        }
        while ri < r_chunks.len() && ro == r_chunks[ri].len() {
            ri += 1;
            ro = 0;
        }
        if li == l_chunks.len() || ri == r_chunks.len() {
            break;
        }

        let take = (l_chunks[li].len() - lo).min(r_chunks[ri].len() - ro);
        pairs.push((l_chunks[li].slice(lo, take), r_chunks[ri].slice(ro, take)));
        lo += take;
        ro += take;
    }
    Ok(pairs)
}
