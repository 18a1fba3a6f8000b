//! Deep merging of JSON configuration layers.

use serde_json::Value;

/// Merge `overlay` into `base`.
///
/// Objects merge key by key, recursively. Any other overlay value
/// (scalars, arrays) replaces the base value. A `null` overlay is ignored
/// so an absent layer never clears defaults.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Merge a list of layers left to right onto `base`
pub fn merge_layers<I>(mut base: Value, layers: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    for layer in layers {
        deep_merge(&mut base, layer);
    }
    base
}
