//! Per-frame render statistics.

/// Counters collected while building and recording a frame.
///
/// Reset at the start of each frame; the renderer logs a snapshot
/// periodically.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenderStats {
    /// Wall time of the whole frame, milliseconds.
    pub frametime_ms: f32,
    /// Time spent in scene traversal and draw-list building, milliseconds.
    pub scene_update_ms: f32,
    /// Time spent recording the geometry pass, milliseconds.
    pub draw_record_ms: f32,
    /// Draw calls issued this frame.
    pub drawcall_count: u32,
    /// Triangles submitted this frame.
    pub triangle_count: u32,
}

impl RenderStats {
    /// Clears all counters for a new frame.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_counters() {
        let mut stats = RenderStats {
            frametime_ms: 16.6,
            scene_update_ms: 1.2,
            draw_record_ms: 0.8,
            drawcall_count: 42,
            triangle_count: 12_000,
        };
        stats.reset();
        assert_eq!(stats.drawcall_count, 0);
        assert_eq!(stats.triangle_count, 0);
        assert_eq!(stats.frametime_ms, 0.0);
    }
}
