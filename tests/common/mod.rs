//! Shared fixtures: user classes covering each dispatch strategy and a
//! registry that knows them.

#![allow(dead_code)]

use std::any::Any;
use std::io;
use std::sync::{Arc, Mutex};

use persist::{
    restore_with, Archivable, Archive, ArchiveConfig, CapabilityError, ClassDef, Env, Import, Obj,
    PersistentRep, Registry, TypePath,
};

/// Install a test subscriber once; `RUST_LOG` controls the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Log sink shared with a subscriber.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with warnings and above written to a buffer; returns the
/// buffer's text alongside the result.
pub fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, captured.text())
}

// ─────────────────────────────────────────────────────────────────────────────
// User classes
// ─────────────────────────────────────────────────────────────────────────────

/// Describes itself through the representation capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Archivable for Point {
    fn type_path(&self) -> TypePath {
        TypePath::new("geometry", "Point")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn persistent_rep(&self, _env: &Env) -> Option<Result<PersistentRep, CapabilityError>> {
        Some(Ok(PersistentRep::new("Point(x=x, y=y)")
            .with_arg("x", Obj::float(self.x))
            .with_arg("y", Obj::float(self.y))
            .with_import(Import::member("geometry", "Point", "Point"))))
    }

    fn attr(&self, name: &str) -> Option<Obj> {
        match name {
            "x" => Some(Obj::float(self.x)),
            "y" => Some(Obj::float(self.y)),
            _ => None,
        }
    }

    fn dyn_eq(&self, other: &dyn Archivable) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }
}

/// Only has an evaluable repr.
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub major: i64,
    pub minor: i64,
}

impl Archivable for Version {
    fn type_path(&self) -> TypePath {
        TypePath::new("releases", "Version")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn repr(&self) -> Option<String> {
        Some(format!("Version({}, {})", self.major, self.minor))
    }

    fn dyn_eq(&self, other: &dyn Archivable) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }
}

/// Opaque: archived through the pickle fallback only.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl Archivable for Blob {
    fn type_path(&self) -> TypePath {
        TypePath::new("storage", "Blob")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn pickle_state(&self) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }

    fn dyn_eq(&self, other: &dyn Archivable) -> bool {
        other.as_any().downcast_ref::<Self>() == Some(self)
    }
}

/// Its capability rejects every call; only the deprecated hook works.
#[derive(Debug, Clone, PartialEq)]
pub struct Legacy {
    pub major: i64,
    pub minor: i64,
}

impl Archivable for Legacy {
    fn type_path(&self) -> TypePath {
        TypePath::new("releases", "Legacy")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn persistent_rep(&self, _env: &Env) -> Option<Result<PersistentRep, CapabilityError>> {
        Some(Err(CapabilityError("bad signature".to_string())))
    }

    #[allow(deprecated)]
    fn archive_1(&self, _env: &Env) -> Option<Result<PersistentRep, CapabilityError>> {
        Some(Ok(PersistentRep::new(format!("Version(a, {})", self.minor))
            .with_arg("a", Obj::int(self.major))
            .with_import(Import::member("releases", "Version", "Version"))))
    }
}

/// Neither a capability, a repr nor pickle state.
#[derive(Debug)]
pub struct Handle;

impl Archivable for Handle {
    fn type_path(&self) -> TypePath {
        TypePath::new("os", "Handle")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry and archives
// ─────────────────────────────────────────────────────────────────────────────

/// Standard registry plus the fixture classes.
pub fn registry() -> Registry {
    let mut registry = Registry::standard();
    registry.register_class(
        ClassDef::new("geometry", "Point")
            .constructor(|_, args| {
                Ok(Obj::instance(Point { x: args.float(0, "x")?, y: args.float(1, "y")? }))
            })
            .method("norm"),
    );
    registry.register_class(ClassDef::new("releases", "Version").constructor(|_, args| {
        Ok(Obj::instance(Version { major: args.int(0, "major")?, minor: args.int(1, "minor")? }))
    }));
    registry.register_class(
        ClassDef::new("storage", "Blob")
            .unpickler(|_, state| Ok(Obj::instance(Blob(state.to_vec())))),
    );
    registry.register_class(ClassDef::list_subclass("containers", "Stack"));
    registry.register_class(ClassDef::dict_subclass("containers", "Record"));
    registry
}

pub fn flat() -> Archive {
    Archive::with_registry(ArchiveConfig::default().with_scoped(false), registry())
}

pub fn scoped() -> Archive {
    Archive::with_registry(ArchiveConfig::default(), registry())
}

/// Both rendering modes, labelled.
pub fn both_modes() -> Vec<(&'static str, Archive)> {
    vec![("flat", flat()), ("scoped", scoped())]
}

/// Render and execute, supplying the side-data table from memory.
pub fn roundtrip(archive: &Archive) -> Env {
    let program = archive.render().unwrap();
    restore_with(archive.registry(), &program, &archive.data_env())
        .unwrap_or_else(|err| panic!("{err}\n--- program ---\n{program}"))
}

pub fn items(obj: &Obj) -> Vec<Obj> {
    obj.sequence_items().expect("not a sequence")
}
