//! Last-resort archival through an opaque byte envelope.
//!
//! The envelope carries the class path and the instance's own state bytes,
//! bincode-encoded. `pickle.loads` in a restored program hands the state to
//! the unpickler registered for that class.

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, RestoreError};
use crate::object::repr::bytes_repr;
use crate::object::{Archivable, Obj, TypePath};
use crate::registry::Registry;

use super::{Import, PersistentRep};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    class: TypePath,
    state: Vec<u8>,
}

/// Encode an instance's state, or fail naming its repr.
pub(crate) fn dumps(value: &dyn Archivable) -> Option<Vec<u8>> {
    let state = value.pickle_state()?;
    bincode::serialize(&Envelope { class: value.type_path(), state }).ok()
}

pub(super) fn pickle_rep(
    value: &dyn Archivable,
    text: &str,
) -> Result<PersistentRep, ArchiveError> {
    let bytes =
        dumps(value).ok_or_else(|| ArchiveError::Unarchivable { repr: text.to_string() })?;
    Ok(PersistentRep::new(format!("loads({})", bytes_repr(&bytes)))
        .with_import(Import::member("pickle", "loads", "loads")))
}

/// Decode an envelope and rebuild the instance.
pub(crate) fn loads(registry: &Registry, bytes: &[u8]) -> Result<Obj, RestoreError> {
    let envelope: Envelope = bincode::deserialize(bytes)
        .map_err(|err| RestoreError::Value(format!("invalid pickle data: {err}")))?;
    let unpickler = registry.unpickler(&envelope.class).ok_or_else(|| {
        RestoreError::Import(format!("no unpickler registered for {}", envelope.class))
    })?;
    unpickler(registry, &envelope.state)
}
