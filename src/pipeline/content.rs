//! Typed page content streams.
//!
//! A page's drawing instructions are decoded once into a flat list of
//! [`Operator`]s. Only the two operators image discovery cares about are kept
//! apart: `cm` (set transform) and `Do` (paint an external object). Everything
//! else collapses into [`Operator::Other`] so positions in the list still
//! match positions in the original stream.

use lopdf::content::Content;
use lopdf::Object;

/// Affine transform `[a b c d e f]` as written by the `cm` operator.
pub type Matrix = [f32; 6];

pub const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// `Do`: paint the XObject registered under this resource name.
    PaintImage(String),
    /// `cm`: concatenate a transform.
    SetTransform(Matrix),
    Other,
}

/// Decode a (decompressed) content stream into operators.
///
/// Malformed `cm`/`Do` operations degrade to [`Operator::Other`] instead of
/// failing the page; only an undecodable stream is an error.
pub fn decode_operators(content: &[u8]) -> Result<Vec<Operator>, lopdf::Error> {
    let content = Content::decode(content)?;
    Ok(content
        .operations
        .iter()
        .map(|op| match op.operator.as_str() {
            "cm" => matrix_operands(&op.operands)
                .map(Operator::SetTransform)
                .unwrap_or(Operator::Other),
            "Do" => match op.operands.first() {
                Some(Object::Name(name)) => Operator::PaintImage(String::from_utf8_lossy(name).into_owned()),
                _ => Operator::Other,
            },
            _ => Operator::Other,
        })
        .collect())
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() != 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, operand) in m.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(m)
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// The transform in effect for the operator at `index`: the nearest
/// `SetTransform` before it, or [`IDENTITY`].
pub fn transform_before(ops: &[Operator], index: usize) -> Matrix {
    ops[..index.min(ops.len())]
        .iter()
        .rev()
        .find_map(|op| match op {
            Operator::SetTransform(m) => Some(*m),
            _ => None,
        })
        .unwrap_or(IDENTITY)
}

/// On-page size of a `width`×`height` raster under `m`.
pub fn scaled_size(width: u32, height: u32, m: &Matrix) -> (f32, f32) {
    ((width as f32 * m[0]).abs(), (height as f32 * m[3]).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_transforms_and_paints() {
        let ops = decode_operators(b"q 200 0 0 -100 10 20 cm /Im0 Do Q BT /F1 12 Tf ET").unwrap();
        assert_eq!(ops[0], Operator::Other);
        assert_eq!(ops[1], Operator::SetTransform([200.0, 0.0, 0.0, -100.0, 10.0, 20.0]));
        assert_eq!(ops[2], Operator::PaintImage("Im0".into()));
        assert!(ops[3..].iter().all(|op| *op == Operator::Other));
    }

    #[test]
    fn malformed_cm_is_other() {
        let ops = decode_operators(b"1 0 0 cm /Im1 Do").unwrap();
        assert_eq!(ops, vec![Operator::Other, Operator::PaintImage("Im1".into())]);
    }

    #[test]
    fn nearest_preceding_transform_wins() {
        let ops = vec![
            Operator::SetTransform([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]),
            Operator::PaintImage("A".into()),
            Operator::SetTransform([3.0, 0.0, 0.0, -5.0, 0.0, 0.0]),
            Operator::Other,
            Operator::PaintImage("B".into()),
        ];
        assert_eq!(transform_before(&ops, 1)[0], 2.0);
        assert_eq!(transform_before(&ops, 4)[3], -5.0);
        assert_eq!(transform_before(&ops, 0), IDENTITY);
    }

    #[test]
    fn scaled_size_uses_absolute_diagonal() {
        assert_eq!(scaled_size(4, 2, &[50.0, 0.0, 0.0, -25.0, 0.0, 0.0]), (200.0, 50.0));
        assert_eq!(scaled_size(4, 2, &IDENTITY), (4.0, 2.0));
    }
}
