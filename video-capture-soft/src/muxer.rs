use std::time::Duration;

use video_capture_core::{CaptureError, MuxOutcome, MuxRequest, Muxer};

use crate::container::{Container, ContainerWriter};

/// Joins two `.vcap` segments by copying their frame records.
///
/// Pre-roll frames are rebased to start at zero; live frames follow, shifted
/// by the pre-roll duration. Payloads are copied untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerMuxer;

impl ContainerMuxer {
    pub fn new() -> Self {
        Self
    }
}

fn mux_error(context: &str) -> impl Fn(crate::container::ContainerError) -> CaptureError + '_ {
    move |e| CaptureError::MuxFailed(format!("{}: {}", context, e))
}

impl Muxer for ContainerMuxer {
    fn mux(&self, request: &MuxRequest) -> Result<MuxOutcome, CaptureError> {
        let pre = Container::read(&request.pre_roll_path).map_err(mux_error("pre-roll segment"))?;
        let live = Container::read(&request.live_path).map_err(mux_error("live segment"))?;

        if (pre.header.width, pre.header.height) != (live.header.width, live.header.height) {
            return Err(CaptureError::MuxFailed(format!(
                "segment dimensions differ: {}x{} vs {}x{}",
                pre.header.width, pre.header.height, live.header.width, live.header.height
            )));
        }
        if pre.header.rotation != live.header.rotation {
            log::warn!(
                "Segment rotations differ ({:?} vs {:?}), keeping the live one",
                pre.header.rotation,
                live.header.rotation
            );
        }

        let offset = if request.pre_roll_duration.is_zero() {
            pre.duration()
        } else {
            request.pre_roll_duration
        };

        let mut writer = ContainerWriter::create(&request.output_path, &live.header).map_err(mux_error("output"))?;

        let pre_base = pre.frames.first().map_or(Duration::ZERO, |f| f.timestamp);
        for frame in &pre.frames {
            writer
                .write_frame(frame.timestamp.saturating_sub(pre_base), &frame.payload)
                .map_err(mux_error("output"))?;
        }

        let live_base = live.frames.first().map_or(Duration::ZERO, |f| f.timestamp);
        for frame in &live.frames {
            writer
                .write_frame(offset + frame.timestamp.saturating_sub(live_base), &frame.payload)
                .map_err(mux_error("output"))?;
        }

        let summary = writer.finish().map_err(mux_error("output"))?;
        let duration = offset + live.duration();

        log::debug!(
            "Muxed {} pre-roll + {} live frames, offset {:?}",
            pre.frames.len(),
            live.frames.len(),
            offset
        );
        Ok(MuxOutcome {
            duration: Some(duration),
            frame_count: Some(summary.frame_count),
        })
    }
}
