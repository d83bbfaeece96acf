//! Replay of recorded mutations onto plain JSON.
//!
//! Records are applied in order. Each one is validated, its container is
//! resolved by walking the path (minus the final key for `set`/`delete`),
//! and the op is performed there. A path that no longer resolves means the
//! target diverged from the state the trace was recorded against.

use crate::error::{value_type_name, FabricError, FabricResult};
use crate::mutation::{Mutation, MutationOp};
use crate::{Key, Path};
use serde_json::Value;

/// Apply every record of `trace` to `target`, in order.
///
/// Stops at the first failing record; earlier records stay applied.
///
/// ```
/// use tirea_fabric::{apply_trace, TraceRoot};
/// use serde_json::json;
///
/// let base = json!({"queue": [1, 2]});
/// let root = TraceRoot::new(base.clone()).unwrap();
/// let queue = root.value().node("queue").unwrap();
/// queue.shift().unwrap();
/// queue.extend([json!(3), json!(4)]).unwrap();
///
/// let mut replica = base;
/// apply_trace(&mut replica, &root.trace()).unwrap();
/// assert_eq!(replica, root.value().to_value());
/// ```
pub fn apply_trace(target: &mut Value, trace: &[Mutation]) -> FabricResult<()> {
    for mutation in trace {
        apply_mutation(target, mutation)?;
    }
    Ok(())
}

/// Pure variant of [`apply_trace`]: replay onto a copy of `base`.
pub fn replay(base: &Value, trace: &[Mutation]) -> FabricResult<Value> {
    let mut doc = base.clone();
    apply_trace(&mut doc, trace)?;
    Ok(doc)
}

/// Apply a single record to `target`.
pub fn apply_mutation(target: &mut Value, mutation: &Mutation) -> FabricResult<()> {
    mutation.validate()?;

    if mutation.op.is_keyed() {
        let (container_keys, key) = mutation
            .path
            .split_last()
            .ok_or_else(|| FabricError::malformed("keyed record with empty path"))?;
        let container = resolve_mut(target, container_keys, &mutation.path)?;
        apply_keyed(container, mutation, key, container_keys)
    } else {
        let container = resolve_mut(target, mutation.path.keys(), &mutation.path)?;
        apply_list(container, mutation)
    }
}

fn resolve_mut<'a>(doc: &'a mut Value, keys: &[Key], full: &Path) -> FabricResult<&'a mut Value> {
    let mut current = doc;
    for key in keys {
        current = match (current, key) {
            (Value::Object(map), Key::Field(name)) => map
                .get_mut(name)
                .ok_or_else(|| FabricError::invalid_path(full.clone(), format!("missing field {name}")))?,
            (Value::Array(items), Key::Index(index)) => {
                let len = items.len();
                items.get_mut(*index).ok_or_else(|| {
                    FabricError::invalid_path(
                        full.clone(),
                        format!("index {index} out of range (len {len})"),
                    )
                })?
            }
            (other, key) => {
                return Err(FabricError::invalid_path(
                    full.clone(),
                    format!("cannot step into {} with key {key}", value_type_name(other)),
                ))
            }
        };
    }
    Ok(current)
}

fn payload(mutation: &Mutation) -> FabricResult<Value> {
    mutation.payload.clone().ok_or_else(|| {
        FabricError::malformed(format!(
            "op {} at {} requires a payload",
            mutation.op.name(),
            mutation.path
        ))
    })
}

fn apply_keyed(
    container: &mut Value,
    mutation: &Mutation,
    key: &Key,
    container_keys: &[Key],
) -> FabricResult<()> {
    match (container, key) {
        (Value::Object(map), Key::Field(name)) => {
            match mutation.op {
                MutationOp::Set => {
                    map.insert(name.clone(), payload(mutation)?);
                }
                _ => {
                    map.remove(name);
                }
            }
            Ok(())
        }
        (Value::Array(items), Key::Index(index)) => {
            let (index, len) = (*index, items.len());
            match mutation.op {
                MutationOp::Set if index < len => items[index] = payload(mutation)?,
                MutationOp::Set if index == len => items.push(payload(mutation)?),
                _ if index < len => {
                    items.remove(index);
                }
                _ => {
                    return Err(FabricError::index_out_of_bounds(
                        Path::from_keys(container_keys.to_vec()),
                        index,
                        len,
                    ))
                }
            }
            Ok(())
        }
        (other, _) => Err(FabricError::invalid_path(
            mutation.path.clone(),
            format!(
                "expected {} container, found {}",
                mutation.kind,
                value_type_name(other)
            ),
        )),
    }
}

fn apply_list(container: &mut Value, mutation: &Mutation) -> FabricResult<()> {
    let found = value_type_name(container);
    let Value::Array(items) = container else {
        return Err(FabricError::invalid_path(
            mutation.path.clone(),
            format!("expected array, found {found}"),
        ));
    };
    match mutation.op {
        MutationOp::Append => {
            if let Value::Array(values) = payload(mutation)? {
                items.extend(values);
            }
        }
        MutationOp::Prepend => {
            if let Value::Array(values) = payload(mutation)? {
                items.splice(0..0, values);
            }
        }
        MutationOp::RemoveFirst => {
            if !items.is_empty() {
                items.remove(0);
            }
        }
        MutationOp::Reverse => items.reverse(),
        MutationOp::Set | MutationOp::Delete => {
            return Err(FabricError::malformed(format!(
                "op {} is not a list op",
                mutation.op.name()
            )))
        }
    }
    Ok(())
}
