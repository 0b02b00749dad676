//! Round-trip tests: archive, render, restore, compare.
//!
//! Every case runs in both flat and scoped mode; values must come back
//! equal and shared objects must come back shared.

mod common;

use common::{
    both_modes, capture_warnings, flat, init_tracing, items, roundtrip, scoped, Blob, Handle,
    Legacy, Point, Version,
};
use persist::{Archive, ArchiveConfig, ArchiveError, NdArray, Obj, Object, SparseMatrix, TypePath};

// ─────────────────────────────────────────────────────────────────────────────
// Aliasing
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_shared_list_stays_shared() {
    init_tracing();
    for (mode, mut archive) in both_modes() {
        let shared = Obj::list(vec![Obj::int(1), Obj::int(2)]);
        archive.insert("a", Obj::list(vec![shared.clone(), shared])).unwrap();
        let ns = roundtrip(&archive);
        let a = items(&ns["a"]);
        assert!(a[0].is(&a[1]), "{mode}: aliasing lost");
        assert_eq!(a[0], Obj::list(vec![Obj::int(1), Obj::int(2)]));
    }
}

#[test]
fn test_sharing_across_roots() {
    for (mode, mut archive) in both_modes() {
        let shared = Obj::dict(vec![(Obj::str("k"), Obj::list(vec![]))]);
        archive.insert("x", Obj::tuple(vec![shared.clone(), Obj::int(0)])).unwrap();
        archive.insert("y", Obj::list(vec![shared.clone()])).unwrap();
        archive.insert("z", shared).unwrap();
        let ns = roundtrip(&archive);
        let z = &ns["z"];
        assert!(items(&ns["x"])[0].is(z), "{mode}: x[0] is not z");
        assert!(items(&ns["y"])[0].is(z), "{mode}: y[0] is not z");
        assert_eq!(ns.len(), 3, "{mode}: leftover names {:?}", ns.keys().collect::<Vec<_>>());
    }
}

#[test]
fn test_diamond() {
    //        A
    //       / \
    //      B   C
    //      |  /|\
    //      | / D E
    //       F   \ /
    //            G
    for (mode, mut archive) in both_modes() {
        let g = Obj::list(vec![Obj::str("G")]);
        let f = Obj::list(vec![Obj::str("F")]);
        let d = Obj::list(vec![g.clone()]);
        let e = Obj::list(vec![g]);
        let c = Obj::list(vec![f.clone(), d, e]);
        let b = Obj::list(vec![f]);
        archive.insert("A", Obj::list(vec![b, c])).unwrap();

        let ns = roundtrip(&archive);
        let a = items(&ns["A"]);
        let (b, c) = (items(&a[0]), items(&a[1]));
        assert!(b[0].is(&c[0]), "{mode}: F not shared");
        let (d, e) = (items(&c[1]), items(&c[2]));
        assert!(d[0].is(&e[0]), "{mode}: G not shared");
        assert!(!c[1].is(&c[2]), "{mode}: D and E merged");
    }
}

#[test]
fn test_same_object_under_two_names() {
    for (mode, mut archive) in both_modes() {
        let value = Obj::list(vec![Obj::str("v")]);
        archive.insert("first", value.clone()).unwrap();
        archive.insert("second", value).unwrap();
        let ns = roundtrip(&archive);
        assert!(ns["first"].is(&ns["second"]), "{mode}: alias lost");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rejections
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_self_reference_is_a_cycle() {
    for (mode, mut archive) in both_modes() {
        let x = Obj::list(vec![]);
        if let Object::List(list) = x.kind() {
            list.push(x.clone());
        }
        archive.insert("x", x).unwrap();
        let err = archive.render().unwrap_err();
        assert!(matches!(err, ArchiveError::Cycle(_)), "{mode}: {err}");
    }
}

#[test]
fn test_indirect_cycle() {
    let a = Obj::list(vec![]);
    let b = Obj::dict(vec![(Obj::str("a"), a.clone())]);
    if let Object::List(list) = a.kind() {
        list.push(b);
    }
    let mut archive = common::flat();
    archive.insert("a", a).unwrap();
    let Err(ArchiveError::Cycle(cycle)) = archive.make_persistent() else {
        panic!("expected a cycle")
    };
    assert!(!cycle.edges.is_empty());
}

#[test]
fn test_unarchivable_object_names_its_repr() {
    let mut archive = common::flat();
    archive.insert("h", Obj::instance(Handle)).unwrap();
    let err = archive.render().unwrap_err();
    assert!(
        matches!(&err, ArchiveError::Unarchivable { repr } if repr.contains("os.Handle")),
        "{err}"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Scalars and builtins
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_scalars() {
    for (mode, mut archive) in both_modes() {
        let values = vec![
            Obj::none(),
            Obj::bool(true),
            Obj::int(-7),
            Obj::float(0.1),
            Obj::float(f64::INFINITY),
            Obj::float(f64::NEG_INFINITY),
            Obj::complex(1.0, -2.5),
            Obj::complex(f64::INFINITY, 1.0),
            Obj::str("it's \"quoted\"\n"),
            Obj::bytes(vec![0u8, 255, b'a']),
            Obj::tuple(vec![]),
            Obj::tuple(vec![Obj::int(1)]),
            Obj::dict(vec![]),
        ];
        archive.insert("values", Obj::list(values.clone())).unwrap();
        let ns = roundtrip(&archive);
        assert_eq!(items(&ns["values"]), values, "{mode}");
    }
}

#[test]
fn test_nan_restores_as_nan() {
    for (mode, mut archive) in both_modes() {
        archive.insert("x", Obj::float(f64::NAN)).unwrap();
        let ns = roundtrip(&archive);
        assert!(ns["x"].as_float().is_some_and(f64::is_nan), "{mode}");
    }
}

#[test]
fn test_types_and_functions() {
    for (mode, mut archive) in both_modes() {
        let registry = archive.registry().clone();
        let none_type = registry.type_of(&Obj::none());
        let list_type = registry.lookup("builtins", "list").cloned().unwrap();
        let np_array = registry.lookup("numpy", "array").cloned().unwrap();
        let types = Obj::list(vec![none_type.clone(), list_type.clone(), np_array.clone()]);
        archive.insert("types", types).unwrap();
        let ns = roundtrip(&archive);
        let types = items(&ns["types"]);
        assert!(types[0].is(&none_type), "{mode}: type(None)");
        assert!(types[1].is(&list_type), "{mode}: list");
        assert!(types[2].is(&np_array), "{mode}: numpy.array");
    }
}

#[test]
fn test_container_subclasses() {
    for (mode, mut archive) in both_modes() {
        let stack = Obj::list_of(
            Some(TypePath::new("containers", "Stack")),
            vec![Obj::int(1), Obj::int(2)],
        );
        let record = Obj::dict_of(
            Some(TypePath::new("containers", "Record")),
            vec![(Obj::str("id"), Obj::int(3))],
        );
        archive.insert("stack", stack.clone()).unwrap();
        archive.insert("record", record.clone()).unwrap();
        let ns = roundtrip(&archive);
        assert_eq!(ns["stack"], stack, "{mode}");
        assert_eq!(ns["record"], record, "{mode}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User types: capability, repr, pickle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_user_types_each_strategy() {
    for (mode, mut archive) in both_modes() {
        archive.insert("p", Obj::instance(Point { x: 1.5, y: -2.0 })).unwrap();
        archive.insert("v", Obj::instance(Version { major: 3, minor: 11 })).unwrap();
        archive.insert("blob", Obj::instance(Blob(vec![1, 2, 3]))).unwrap();
        let ns = roundtrip(&archive);
        assert_eq!(ns["p"].downcast_ref::<Point>(), Some(&Point { x: 1.5, y: -2.0 }), "{mode}");
        let version = Version { major: 3, minor: 11 };
        assert_eq!(ns["v"].downcast_ref::<Version>(), Some(&version), "{mode}");
        assert_eq!(ns["blob"].downcast_ref::<Blob>(), Some(&Blob(vec![1, 2, 3])), "{mode}");
    }
}

#[test]
fn test_failing_capability_falls_back_to_deprecated_hook() {
    let legacy = || Obj::instance(Legacy { major: 7, minor: 2 });
    let expected = Obj::instance(Version { major: 7, minor: 2 });

    let mut archive = flat();
    archive.insert("v", legacy()).unwrap();
    let (program, warnings) = capture_warnings(|| archive.render().unwrap());
    assert_eq!(
        program,
        "from releases import Version as _Version\n\
         v = _Version(7, 2)\n\
         del _Version\n\
         try: del __builtins__, _arrays\n\
         except NameError: pass"
    );
    assert!(warnings.contains("persistent_rep() failed; falling back"), "{warnings}");
    assert!(warnings.contains("bad signature"), "{warnings}");
    assert!(warnings.contains("archive_1 is deprecated"), "{warnings}");
    assert_eq!(roundtrip(&archive)["v"], expected);

    let mut archive = scoped();
    archive.insert("v", legacy()).unwrap();
    let (program, warnings) = capture_warnings(|| archive.render().unwrap());
    assert_eq!(
        program,
        "_g1 = 7\n\
         \n\
         def v(a=_g1):\n    \
         from releases import Version\n    \
         return Version(a, 2)\n\
         v = v()\n\
         del _g1\n\
         try: del __builtins__, _arrays\n\
         except NameError: pass"
    );
    assert!(warnings.contains("archive_1 is deprecated"), "{warnings}");
    assert_eq!(roundtrip(&archive)["v"], expected);
}

#[test]
fn test_bound_and_unbound_methods() {
    for (mode, mut archive) in both_modes() {
        let point = Obj::instance(Point { x: 3.0, y: 4.0 });
        let bound = Obj::bound_method(point.clone(), "norm");
        let unbound = Obj::unbound_method(TypePath::new("geometry", "Point"), "norm");
        archive.insert("point", point).unwrap();
        archive.insert("bound", bound.clone()).unwrap();
        archive.insert("unbound", unbound.clone()).unwrap();
        let ns = roundtrip(&archive);
        assert_eq!(ns["bound"], bound, "{mode}");
        assert_eq!(ns["unbound"], unbound, "{mode}");
        let Object::Method(method) = ns["bound"].kind() else { panic!("{mode}: not a method") };
        let persist::object::Receiver::Instance(receiver) = &method.receiver else {
            panic!("{mode}: unbound")
        };
        assert!(receiver.is(&ns["point"]), "{mode}: receiver not shared");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arrays
// ─────────────────────────────────────────────────────────────────────────────

fn matrix() -> NdArray {
    NdArray::from_f64(vec![1.0, 2.5, -3.0, 4.0, 5.0, 6.25]).reshape(vec![2, 3]).unwrap()
}

#[test]
fn test_array_threshold_boundary() {
    // Six elements: inlined at threshold 6, offloaded at 5.
    let cases = [(None, false), (Some(6), false), (Some(5), true), (Some(0), true)];
    for (threshold, offloaded) in cases {
        for scoped in [false, true] {
            let config =
                ArchiveConfig::default().with_scoped(scoped).with_array_threshold(threshold);
            let mut archive = Archive::with_registry(config, common::registry());
            archive.insert("m", Obj::array(matrix())).unwrap();
            let ns = roundtrip(&archive);
            assert_eq!(archive.data().len(), usize::from(offloaded), "threshold {threshold:?}");
            let context = format!("threshold {threshold:?} scoped {scoped}");
            assert_eq!(ns["m"].as_array(), Some(&matrix()), "{context}");
        }
    }
}

#[test]
fn test_offloaded_array_shared() {
    let config = ArchiveConfig::default().with_array_threshold(Some(1));
    let mut archive = Archive::with_registry(config, common::registry());
    let array = Obj::array(matrix());
    archive.insert("pair", Obj::list(vec![array.clone(), array])).unwrap();
    let ns = roundtrip(&archive);
    let pair = items(&ns["pair"]);
    assert!(pair[0].is(&pair[1]));
    assert_eq!(archive.data().len(), 1);
}

#[test]
fn test_array_text_form() {
    for (mode, mut archive) in both_modes() {
        archive.config_mut().tostring = false;
        let ints = NdArray::from_i64(vec![1, 2, 3]);
        let floats = NdArray::from_f64(vec![1.0, f64::INFINITY, -0.5]);
        archive.insert("ints", Obj::array(ints.clone())).unwrap();
        archive.insert("floats", Obj::array(floats.clone())).unwrap();
        let ns = roundtrip(&archive);
        assert_eq!(ns["ints"].as_array(), Some(&ints), "{mode}");
        assert_eq!(ns["floats"].as_array(), Some(&floats), "{mode}");
    }
}

#[test]
fn test_sparse_matrices() {
    for (mode, mut archive) in both_modes() {
        let csr = SparseMatrix::csr(
            Obj::array(NdArray::from_f64(vec![1.0, 2.0])),
            Obj::array(NdArray::from_i64(vec![0, 1])),
            Obj::array(NdArray::from_i64(vec![0, 1, 2])),
            (2, 2),
        );
        let dia = SparseMatrix::dia(
            Obj::array(NdArray::from_f64(vec![1.0, 2.0]).reshape(vec![1, 2]).unwrap()),
            Obj::array(NdArray::from_i64(vec![0])),
            (2, 2),
        );
        archive.insert("csr", Obj::sparse(csr.clone())).unwrap();
        archive.insert("dia", Obj::sparse(dia.clone())).unwrap();
        let ns = roundtrip(&archive);
        assert_eq!(ns["csr"], Obj::sparse(csr), "{mode}");
        assert_eq!(ns["dia"], Obj::sparse(dia), "{mode}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Environments
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_env_names_avoided_by_element_names() {
    for (mode, mut archive) in both_modes() {
        let env = persist::Env::from([("_l_0".to_string(), Obj::int(99))]);
        archive.insert_env("l", Obj::list(vec![Obj::list(vec![]), Obj::int(5)]), &env).unwrap();
        let ns = roundtrip(&archive);
        assert_eq!(ns["l"], Obj::list(vec![Obj::list(vec![]), Obj::int(5)]), "{mode}");
    }
}
