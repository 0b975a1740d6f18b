//! Dynamic rendering attachment configuration.
//!
//! Small builder around `vk::RenderingInfo` so callers describe a pass as
//! data instead of juggling attachment structs and their lifetimes.

use ash::vk;

/// A color attachment for one dynamic rendering pass.
#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    /// Cleared to `clear_color` at pass start.
    pub fn clear(view: vk::ImageView, clear_color: [f32; 4]) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color,
        }
    }

    /// Keeps existing contents, for drawing over a compute-written image.
    pub fn load(view: vk::ImageView) -> Self {
        Self {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0; 4],
        }
    }

    fn to_rendering_attachment_info(self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

/// A depth attachment for one dynamic rendering pass.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    pub view: vk::ImageView,
    pub clear_depth: f32,
}

impl DepthAttachment {
    pub fn clear(view: vk::ImageView, clear_depth: f32) -> Self {
        Self { view, clear_depth }
    }

    fn to_rendering_attachment_info(self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Declarative description of one dynamic rendering pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderingConfig {
    pub extent: vk::Extent2D,
    pub color: ColorAttachment,
    pub depth: Option<DepthAttachment>,
}

impl RenderingConfig {
    pub fn new(extent: vk::Extent2D, color: ColorAttachment) -> Self {
        Self {
            extent,
            color,
            depth: None,
        }
    }

    pub fn with_depth(mut self, depth: DepthAttachment) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Builds the bundle that owns the attachment info structs.
    ///
    /// `vk::RenderingInfo` borrows its attachment arrays, so they have to
    /// outlive the `cmd_begin_rendering` call; the bundle keeps them alive.
    pub fn build(self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            extent: self.extent,
            color_attachments: [self.color.to_rendering_attachment_info()],
            depth_attachment: self.depth.map(DepthAttachment::to_rendering_attachment_info),
        }
    }
}

/// Owns the attachment infos referenced by the borrowed `RenderingInfo`.
pub struct RenderingInfoBundle {
    extent: vk::Extent2D,
    color_attachments: [vk::RenderingAttachmentInfo<'static>; 1],
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
}

impl RenderingInfoBundle {
    /// The info to pass to `CommandBuffer::begin_rendering`.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        if let Some(depth) = &self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_color_attachment() {
        let attachment = ColorAttachment::clear(vk::ImageView::null(), [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.clear_color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_load_color_attachment_preserves_contents() {
        let attachment = ColorAttachment::load(vk::ImageView::null());
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn test_rendering_info_area_matches_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let bundle = RenderingConfig::new(
            extent,
            ColorAttachment::clear(vk::ImageView::null(), [0.0; 4]),
        )
        .build();

        let info = bundle.info();
        assert_eq!(info.render_area.extent.width, 1280);
        assert_eq!(info.render_area.extent.height, 720);
        assert_eq!(info.layer_count, 1);
        assert_eq!(info.color_attachment_count, 1);
    }

    #[test]
    fn test_depth_attachment_is_optional() {
        let extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        let without = RenderingConfig::new(
            extent,
            ColorAttachment::clear(vk::ImageView::null(), [0.0; 4]),
        )
        .build();
        assert!(without.info().p_depth_attachment.is_null());

        let with = RenderingConfig::new(
            extent,
            ColorAttachment::clear(vk::ImageView::null(), [0.0; 4]),
        )
        .with_depth(DepthAttachment::clear(vk::ImageView::null(), 0.0))
        .build();
        assert!(!with.info().p_depth_attachment.is_null());
    }
}
