//! Measures PLY read (parse) and write speeds.

use std::io::Cursor;
use criterion::{
    criterion_group, criterion_main, black_box, Criterion,
};

use plybuf::{Reader, ScalarType, Writer};


// ===============================================================================================
// ===== Helper utilities
// ===============================================================================================

/// Number of vertices along one side of the generated grid.
const GRID_SIZE: u32 = 200;

/// Vertex positions and quad indices of a flat `GRID_SIZE`² grid.
struct Grid {
    positions: Vec<f32>,
    quads: Vec<u32>,
}

impl Grid {
    fn new() -> Self {
        let mut positions = Vec::new();
        for y in 0..GRID_SIZE {
            for x in 0..GRID_SIZE {
                positions.extend_from_slice(&[x as f32, y as f32, 0.0]);
            }
        }

        let mut quads = Vec::new();
        for y in 0..GRID_SIZE - 1 {
            for x in 0..GRID_SIZE - 1 {
                let i = y * GRID_SIZE + x;
                quads.extend_from_slice(&[i, i + 1, i + GRID_SIZE + 1, i + GRID_SIZE]);
            }
        }

        Self { positions, quads }
    }

    fn writer(&self) -> Writer<'_> {
        let mut writer = Writer::new();
        writer.add_comment("benchmark grid");
        writer.add_typed_properties_to_element(
            "vertex",
            &["x", "y", "z"],
            self.positions.len() / 3,
            &self.positions,
            None,
            0,
        ).unwrap();
        writer.add_typed_properties_to_element(
            "face",
            &["vertex_indices"],
            self.quads.len() / 4,
            &self.quads,
            Some(ScalarType::Uint8),
            4,
        ).unwrap();
        writer
    }

    fn encode(&self, binary: bool) -> Vec<u8> {
        let mut out = Vec::new();
        self.writer().write(&mut out, binary).unwrap();
        out
    }
}

fn read_grid(data: &[u8], face_hint: u32) {
    let mut reader = Reader::new(Cursor::new(data));
    reader.parse_header().unwrap();
    let positions = reader.request_properties_from_element("vertex", &["x", "y", "z"], 0)
        .unwrap();
    let faces = reader.request_properties_from_element("face", &["vertex_indices"], face_hint)
        .unwrap();
    reader.read().unwrap();

    black_box(reader.data(positions));
    black_box(reader.data(faces));
}


// ===============================================================================================
// ===== Benchmarks
// ===============================================================================================

/// Measures reading all properties with list size hints, i.e. a single pass.
fn read_hinted(c: &mut Criterion) {
    let grid = Grid::new();
    let binary = grid.encode(true);
    let ascii = grid.encode(false);

    c.bench_function_over_inputs(
        "ply_read_grid_hinted",
        move |b, encoding| {
            // String inputs give more useful benchmark names than indices.
            let data = match *encoding {
                "binary" => &binary,
                "ascii" => &ascii,
                _ => unreachable!(),
            };
            b.iter(|| read_grid(data, 4))
        },
        vec!["binary", "ascii"],
    );
}

/// Measures reading all properties without hints, i.e. measuring and storing.
fn read_two_pass(c: &mut Criterion) {
    let grid = Grid::new();
    let binary = grid.encode(true);
    let ascii = grid.encode(false);

    c.bench_function_over_inputs(
        "ply_read_grid_two_pass",
        move |b, encoding| {
            let data = match *encoding {
                "binary" => &binary,
                "ascii" => &ascii,
                _ => unreachable!(),
            };
            b.iter(|| read_grid(data, 0))
        },
        vec!["binary", "ascii"],
    );
}

fn write(c: &mut Criterion) {
    let grid = Grid::new();
    let len = grid.encode(false).len();

    c.bench_function_over_inputs(
        "ply_write_grid",
        move |b, encoding| {
            let binary = *encoding == "binary";
            let mut writer = grid.writer();
            b.iter(|| {
                let mut out = Vec::with_capacity(len);
                writer.write(&mut out, binary).unwrap();
                black_box(out);
            })
        },
        vec!["binary", "ascii"],
    );
}


criterion_group!(benches, read_hinted, read_two_pass, write);
criterion_main!(benches);
