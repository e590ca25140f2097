//! Transfer functions: scalar volume value to colour and opacity

use std::sync::Arc;

use crate::core::types::{Vec2, Vec3, Vec4};
use crate::core::{Error, Result};
use crate::object::{CommitContext, ManagedObject, ParamSet, Snapshot};

/// Committed piecewise-linear mapping.
///
/// Colours and opacities are independent tables spread evenly over
/// `value_range`; values outside the range clamp to the end entries.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferFunction {
    pub colors: Vec<Vec3>,
    pub opacities: Vec<f32>,
    pub value_range: Vec2,
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self {
            colors: vec![Vec3::ZERO, Vec3::ONE],
            opacities: vec![0.0, 1.0],
            value_range: Vec2::new(0.0, 1.0),
        }
    }
}

impl TransferFunction {
    /// RGB in `xyz`, opacity in `w`.
    pub fn map(&self, value: f32) -> Vec4 {
        let span = self.value_range.y - self.value_range.x;
        let t = if span > 0.0 {
            ((value - self.value_range.x) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let color = lookup(&self.colors, t, |a, b, f| a.lerp(*b, f)).unwrap_or(Vec3::ZERO);
        let opacity = lookup(&self.opacities, t, |a, b, f| a + (b - a) * f).unwrap_or(0.0);
        color.extend(opacity)
    }
}

fn lookup<T: Copy>(table: &[T], t: f32, lerp: impl Fn(&T, &T, f32) -> T) -> Option<T> {
    match table {
        [] => None,
        [only] => Some(*only),
        _ => {
            let x = t * (table.len() - 1) as f32;
            let i = (x.floor() as usize).min(table.len() - 2);
            Some(lerp(&table[i], &table[i + 1], x - i as f32))
        }
    }
}

/// Object form of [`TransferFunction`].
///
/// Parameters: `colors` (vec3f array), `opacities` (float array),
/// `valueRange` (vec2f, default `[0, 1]`).
#[derive(Default)]
pub struct PiecewiseLinearTransferFunction;

impl ManagedObject for PiecewiseLinearTransferFunction {
    fn commit(&mut self, params: &ParamSet, _ctx: &CommitContext<'_>) -> Result<Snapshot> {
        let defaults = TransferFunction::default();
        let value_range = params.get_vec2f("valueRange", defaults.value_range);
        if value_range.y < value_range.x {
            return Err(Error::Usage(format!("transfer function 'valueRange' {} is inverted", value_range)));
        }

        let tf = TransferFunction {
            colors: params
                .get_vec3f_array("colors")
                .map_or(defaults.colors, |c| c.to_vec()),
            opacities: params
                .get_float_array("opacities")
                .map_or(defaults.opacities, |o| o.to_vec()),
            value_range,
        };
        Ok(Snapshot::TransferFunction(Arc::new(tf)))
    }
}
