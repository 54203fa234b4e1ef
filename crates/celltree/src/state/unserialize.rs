#![forbid(unsafe_code)]

//! Building nodes from constructor arguments plus saved state.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value as Json};

use super::{BlockRef, Exported};
use crate::error::{CellError, Result};
use crate::value::Value;

/// Constructor keyword arguments.
pub type Kwargs = BTreeMap<String, Value>;

/// Types constructible from keyword arguments.
///
/// Implementations remove the arguments they consume; anything left over is
/// reported as [`CellError::UnknownParameter`].
pub trait FromKwargs: Sized {
    fn from_kwargs(kwargs: &mut Kwargs) -> Result<Self>;
}

/// Remove `name` from `kwargs` and convert it.
///
/// # Errors
///
/// [`CellError::TypeCoercion`] if the value is present but of the wrong kind.
pub fn take_kwarg<T>(kwargs: &mut Kwargs, name: &str) -> Result<Option<T>>
where
    T: TryFrom<Value, Error = CellError>,
{
    kwargs.remove(name).map(T::try_from).transpose()
}

/// Construct a `T` from `kwargs` and `state`.
///
/// State keys whose declaration names a constructor parameter are coerced
/// and passed as that keyword, replacing any explicit argument of the same
/// name. The remaining keys are applied with `state_from_json` after
/// construction.
///
/// # Errors
///
/// Whatever `T::from_kwargs` returns, or [`CellError::UnknownParameter`] for
/// arguments it did not consume. Per-key state failures are only logged.
pub fn unserialize_exported_state<T: FromKwargs + Exported>(
    mut kwargs: Kwargs,
    state: &Json,
) -> Result<Rc<T>> {
    let mut remaining: Map<String, Json> = match state {
        Json::Object(map) => map.clone(),
        Json::Null => Map::new(),
        other => {
            tracing::warn!(%other, "state for construction is not an object; ignoring");
            Map::new()
        }
    };

    for (key, param, value_type) in T::schema().parameters() {
        let Some(json) = remaining.remove(&key) else {
            continue;
        };
        let coerced = Value::from_json(&json)
            .ok_or_else(|| CellError::coercion(value_type.to_string(), &json))
            .and_then(|v| value_type.coerce(v));
        match coerced {
            Ok(value) => {
                kwargs.insert(param, value);
            }
            Err(error) => tracing::warn!(%key, %error, "ignoring constructor state value"),
        }
    }

    let node = T::from_kwargs(&mut kwargs)?;
    if let Some(name) = kwargs.into_keys().next() {
        return Err(CellError::UnknownParameter { name });
    }
    let node = Rc::new(node);
    BlockRef::from_rc(Rc::clone(&node)).state_from_json(&Json::Object(remaining));
    Ok(node)
}
