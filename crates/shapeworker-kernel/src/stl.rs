use std::fmt::Write;

use crate::geometry::{cross, normalize, sub};
use crate::mesh::MeshData;

/// Render a mesh as an ASCII STL document.
///
/// Facet normals come from the triangle winding; degenerate triangles get a
/// zero normal, which STL readers accept.
pub fn to_ascii_stl(name: &str, mesh: &MeshData) -> String {
    let name = sanitize(name);
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "solid {name}");
    for [a, b, c] in mesh.triangles() {
        let n = normalize(cross(sub(b, a), sub(c, a))).unwrap_or([0.0; 3]);
        let _ = writeln!(out, "  facet normal {:e} {:e} {:e}", n[0], n[1], n[2]);
        let _ = writeln!(out, "    outer loop");
        for v in [a, b, c] {
            let _ = writeln!(out, "      vertex {:e} {:e} {:e}", v[0], v[1], v[2]);
        }
        let _ = writeln!(out, "    endloop");
        let _ = writeln!(out, "  endfacet");
    }
    let _ = writeln!(out, "endsolid {name}");
    out
}

/// STL solid names are a single token.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "shape".into() } else { cleaned }
}
