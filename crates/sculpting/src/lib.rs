//! Multiresolution mesh sculpting core for Pentimento.
//!
//! This crate provides interactive sculpting of polygon meshes with:
//! - Ray picking against a per-mesh BVH
//! - Thirteen brush tools (Brush, Inflate, Smooth, Drag, Paint, ...)
//! - A multiresolution stack whose finer levels keep their carved detail
//!   when coarser levels are edited
//! - Stroke-granular undo/redo with a bounded history
//!
//! # Architecture
//!
//! A [`scene::Scene`] owns one [`multires::Multimesh`] per mesh; each level
//! of a stack is a [`mesh::Mesh`] with its adjacency, normals and picking
//! index. The [`pipeline::SculptingPipeline`] drives strokes against the
//! scene and records them in [`history::History`].
//!
//! ## Key Components
//!
//! - **Geometry**: Stateless ray, triangle and plane helpers
//! - **Mesh / Spatial**: Mixed tri/quad meshes and their BVH
//! - **Deformation**: One pure function per tool, single dispatch point
//! - **Multires**: Subdivision operators, detail offsets, level sync
//! - **History**: Open-record stroke merging and linear undo/redo
//! - **GPU**: Dirty regions and `Pod` vertices for partial uploads
//! - **Pipeline**: Press → dabs → release, plus structural edits

pub mod brush;
pub mod deformation;
pub mod geometry;
pub mod gpu;
pub mod history;
pub mod mesh;
pub mod multires;
pub mod pipeline;
pub mod scene;
pub mod spatial;
pub mod types;

pub use brush::{FalloffCurve, MoveAnchor, SculptBrushEngine, StrokeState};
pub use deformation::{DabInfo, ToolEdit, apply_tool};
pub use geometry::{Plane, Ray};
pub use gpu::{DirtyRegion, RenderVertex};
pub use history::{History, HistoryRecord, RecordHandle, VertexDiff};
pub use mesh::{Face, FaceId, Mesh, MeshData, MeshError, Symmetry, Touched, VertexAttributes, VertexId};
pub use multires::{MultiresError, Multimesh, SyncChanges};
pub use pipeline::{PipelineError, SculptingPipeline};
pub use scene::{Scene, SceneError};
pub use spatial::{Aabb, Bvh, RadiusHits, RayHit};
pub use types::{MeshId, PickResult, ToolKind, ToolSettings};

pub use sculpt_config::SculptConfig;
