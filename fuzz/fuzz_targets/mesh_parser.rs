#![no_main]

use libfuzzer_sys::fuzz_target;
use tmop::{BasisKind, FiniteElementSpace, Mesh};

fuzz_target!(|txt: &str| {
    let Ok(mesh) = txt.parse::<Mesh>() else {
        return;
    };
    // Whatever parses must survive a write/read cycle.
    let mut out = Vec::new();
    mesh.write_mfem(&mut out).unwrap();
    let again: Mesh = String::from_utf8(out).unwrap().parse().unwrap();
    assert_eq!(again.elements().len(), mesh.elements().len());

    if mesh.elements().len() <= 16 {
        let refined = mesh.uniform_refinement();
        let _ = FiniteElementSpace::new(&refined, 2, BasisKind::Lagrange);
    }
});
