//! Scene graph, camera, and draw-list building.
//!
//! The scene is a tree of nodes carrying local transforms and optional
//! mesh references. Each frame the tree is flattened into a [`DrawContext`]
//! of self-contained [`RenderObject`]s, which the renderer sorts and
//! records without ever touching the graph again.

pub mod bounds;
pub mod camera;
pub mod draw;
pub mod material;
pub mod mesh;
pub mod node;

pub use bounds::Bounds;
pub use camera::Camera;
pub use draw::{DrawContext, RenderObject, SceneData};
pub use material::{MaterialConstants, MaterialInstance, MaterialPass, MaterialPipeline};
pub use mesh::{GeoSurface, MeshAsset};
pub use node::{Node, NodeHandle};
