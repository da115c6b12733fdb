//! Parse and validate every kernel the way the GPU backend builds it:
//! the shared declarations followed by one stage. Needs no adapter.

use std::fs;
use std::mem::{offset_of, size_of};
use std::path::Path;

use nbody_physics::ParticleState;
use nbody_simulation::PipelineParams;

const COMMON: &str = "common.wgsl";
const STAGES: [&str; 4] = [
    "cell_index.wgsl",
    "cell_aggregate.wgsl",
    "grid_update.wgsl",
    "direct_update.wgsl",
];

fn read_shader(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("src/shaders")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {path:?}: {e}"))
}

/// Shared declarations plus `stage`, as `concat!` assembles them
fn stage_source(stage: &str) -> String {
    read_shader(COMMON) + &read_shader(stage)
}

fn parse(stage: &str, source: &str) -> Result<naga::Module, String> {
    naga::front::wgsl::parse_str(source)
        .map_err(|e| format!("Failed to parse {stage}:\n{}", e.emit_to_string(source)))
}

#[test]
fn validate_all_stages() {
    let mut errors = Vec::new();

    for stage in STAGES {
        let source = stage_source(stage);
        let module = match parse(stage, &source) {
            Ok(module) => module,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        if let Err(e) = validator.validate(&module) {
            errors.push(format!("Failed to validate {stage}:\n{e:?}"));
            continue;
        }

        if !module.entry_points.iter().any(|ep| ep.name == "main") {
            errors.push(format!("{stage} has no `main` entry point"));
        }
    }

    if !errors.is_empty() {
        panic!("Shader validation failed:\n{}", errors.join("\n"));
    }
}

struct WgslLayout {
    size: u32,
    offsets: Vec<(String, u32)>,
}

impl WgslLayout {
    fn offset(&self, member: &str) -> u32 {
        self.offsets
            .iter()
            .find(|(name, _)| name == member)
            .map(|&(_, offset)| offset)
            .unwrap_or_else(|| panic!("Member {member} not found"))
    }
}

fn struct_layout(struct_name: &str) -> WgslLayout {
    // The declarations alone have no entry point, so borrow the first stage
    let source = stage_source(STAGES[0]);
    let module = parse(STAGES[0], &source).unwrap_or_else(|e| panic!("{e}"));

    let mut layouter = naga::proc::Layouter::default();
    layouter
        .update(module.to_ctx())
        .unwrap_or_else(|e| panic!("Failed to compute layout: {e}"));

    let (handle, ty) = module
        .types
        .iter()
        .find(|(_, ty)| ty.name.as_deref() == Some(struct_name))
        .unwrap_or_else(|| panic!("Struct {struct_name} not found"));
    let naga::TypeInner::Struct { members, .. } = &ty.inner else {
        panic!("Type {struct_name} is not a struct");
    };

    WgslLayout {
        size: layouter[handle].size,
        offsets: members
            .iter()
            .filter_map(|m| Some((m.name.clone()?, m.offset)))
            .collect(),
    }
}

#[test]
fn params_layout_matches_wgsl() {
    let layout = struct_layout("Params");
    assert_eq!(layout.size as usize, size_of::<PipelineParams>());
    assert_eq!(layout.offset("dims") as usize, offset_of!(PipelineParams, dims));
    assert_eq!(
        layout.offset("world_min") as usize,
        offset_of!(PipelineParams, world_min)
    );
    assert_eq!(
        layout.offset("inv_cell_size") as usize,
        offset_of!(PipelineParams, inv_cell_size)
    );
    assert_eq!(layout.offset("counts") as usize, offset_of!(PipelineParams, counts));
    assert_eq!(layout.offset("tuning") as usize, offset_of!(PipelineParams, tuning));
}

#[test]
fn particle_state_layout_matches_wgsl() {
    let layout = struct_layout("ParticleState");
    assert_eq!(layout.size as usize, size_of::<ParticleState>());
    assert_eq!(
        layout.offset("velocity") as usize,
        offset_of!(ParticleState, velocity)
    );
}
