//! Scene graph nodes.
//!
//! Nodes form a tree via shared handles: children are owned `Rc`s, the
//! parent link is a `Weak` so cycles cannot leak. The graph is built and
//! traversed on the render thread only.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use glam::Mat4;

use crate::draw::{DrawContext, RenderObject};
use crate::mesh::MeshAsset;

/// Shared ownership handle for a scene node.
pub type NodeHandle = Rc<RefCell<Node>>;

/// A node in the scene tree.
///
/// `world_transform` is a cache; it is only valid after a
/// [`Node::refresh_transform`] pass from the root since the last edit of
/// any ancestor's `local_transform`.
pub struct Node {
    pub parent: Weak<RefCell<Node>>,
    pub children: Vec<NodeHandle>,
    pub local_transform: Mat4,
    pub world_transform: Mat4,
    pub mesh: Option<Arc<MeshAsset>>,
}

impl Node {
    pub fn new(local_transform: Mat4) -> NodeHandle {
        Rc::new(RefCell::new(Self {
            parent: Weak::new(),
            children: Vec::new(),
            local_transform,
            world_transform: local_transform,
            mesh: None,
        }))
    }

    pub fn with_mesh(local_transform: Mat4, mesh: Arc<MeshAsset>) -> NodeHandle {
        let node = Self::new(local_transform);
        node.borrow_mut().mesh = Some(mesh);
        node
    }

    /// Attaches `child` under `parent`, replacing any previous parent link.
    pub fn add_child(parent: &NodeHandle, child: NodeHandle) {
        child.borrow_mut().parent = Rc::downgrade(parent);
        parent.borrow_mut().children.push(child);
    }

    /// Recomputes world transforms for `node` and everything below it.
    ///
    /// Pre-order: a parent's world transform is final before any child
    /// reads it, so one pass suffices regardless of depth.
    pub fn refresh_transform(node: &NodeHandle, parent_matrix: &Mat4) {
        let children = {
            let mut n = node.borrow_mut();
            n.world_transform = *parent_matrix * n.local_transform;
            n.children.clone()
        };

        let world = node.borrow().world_transform;
        for child in &children {
            Self::refresh_transform(child, &world);
        }
    }

    /// Appends this subtree's mesh surfaces to the draw context.
    ///
    /// `top_matrix` re-roots the subtree for this draw only: it multiplies
    /// the cached world transforms without mutating them, so the same tree
    /// can be drawn at several placements per frame. Call
    /// [`Node::refresh_transform`] first if the tree itself changed.
    pub fn draw(node: &NodeHandle, top_matrix: &Mat4, ctx: &mut DrawContext) {
        let (mesh, world, children) = {
            let n = node.borrow();
            (n.mesh.clone(), n.world_transform, n.children.clone())
        };

        if let Some(mesh) = mesh {
            for surface in &mesh.surfaces {
                let Some(material) = &surface.material else {
                    continue;
                };
                ctx.push(RenderObject {
                    index_count: surface.count,
                    first_index: surface.start_index,
                    index_buffer: mesh.buffers.index_buffer.handle(),
                    material: Arc::clone(material),
                    bounds: surface.bounds,
                    transform: *top_matrix * world,
                    vertex_buffer_address: mesh.buffers.vertex_buffer_address,
                });
            }
        }

        for child in &children {
            Self::draw(child, top_matrix, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_world_transform_composes_parent_chain() {
        let root = Node::new(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        let mid = Node::new(Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));
        let leaf = Node::new(Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0)));

        Node::add_child(&root, Rc::clone(&mid));
        Node::add_child(&mid, Rc::clone(&leaf));

        Node::refresh_transform(&root, &Mat4::IDENTITY);

        let p = leaf
            .borrow()
            .world_transform
            .transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(10.0, 5.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let root = Node::new(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let child = Node::new(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
        Node::add_child(&root, Rc::clone(&child));

        Node::refresh_transform(&root, &Mat4::IDENTITY);
        let first = child.borrow().world_transform;

        Node::refresh_transform(&root, &Mat4::IDENTITY);
        let second = child.borrow().world_transform;

        assert_eq!(first, second);
    }

    #[test]
    fn test_refresh_picks_up_local_edits() {
        let root = Node::new(Mat4::IDENTITY);
        let child = Node::new(Mat4::IDENTITY);
        Node::add_child(&root, Rc::clone(&child));

        Node::refresh_transform(&root, &Mat4::IDENTITY);
        assert_eq!(child.borrow().world_transform, Mat4::IDENTITY);

        root.borrow_mut().local_transform = Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0));
        Node::refresh_transform(&root, &Mat4::IDENTITY);

        let p = child
            .borrow()
            .world_transform
            .transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_parent_link_is_weak() {
        let root = Node::new(Mat4::IDENTITY);
        let child = Node::new(Mat4::IDENTITY);
        Node::add_child(&root, Rc::clone(&child));

        assert!(child.borrow().parent.upgrade().is_some());
        drop(root);
        // Child's weak parent link does not keep the root alive, and the
        // dropped root releases its strong child reference.
        assert!(child.borrow().parent.upgrade().is_none());
    }

    #[test]
    fn test_draw_without_meshes_produces_nothing() {
        let root = Node::new(Mat4::IDENTITY);
        let child = Node::new(Mat4::IDENTITY);
        Node::add_child(&root, child);

        let mut ctx = DrawContext::new();
        Node::draw(&root, &Mat4::IDENTITY, &mut ctx);

        assert!(ctx.opaque_surfaces.is_empty());
        assert!(ctx.transparent_surfaces.is_empty());
    }

    #[test]
    fn test_draw_with_base_matrix_leaves_cached_transforms_alone() {
        let root = Node::new(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let child = Node::new(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));
        Node::add_child(&root, Rc::clone(&child));
        Node::refresh_transform(&root, &Mat4::IDENTITY);

        let cached_root = root.borrow().world_transform;
        let cached_child = child.borrow().world_transform;

        // Drawing the same tree at two placements must not touch the
        // cached world transforms.
        let mut ctx = DrawContext::new();
        Node::draw(&root, &Mat4::from_translation(Vec3::new(0.0, 0.0, 9.0)), &mut ctx);
        Node::draw(&root, &Mat4::IDENTITY, &mut ctx);

        assert_eq!(root.borrow().world_transform, cached_root);
        assert_eq!(child.borrow().world_transform, cached_child);
    }
}
