use std::io::{Read, Seek};

use serde::Serialize;

use crate::error::Result;
use crate::stream::BundleStream;

/// Raw keyframe data for one animated target attribute.
///
/// Channel semantics (attribute meaning, interpolation curves) are not
/// interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationChannel {
    pub target_id: String,
    pub target_attribute: u32,
    pub key_times: Vec<u32>,
    pub values: Vec<f32>,
    pub tangents_in: Vec<f32>,
    pub tangents_out: Vec<f32>,
    pub interpolation: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Animation {
    pub id: String,
    pub channels: Vec<AnimationChannel>,
}

/// Decodes an ANIMATIONS object: a counted list of animations.
pub(crate) fn read_animations<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<Vec<Animation>> {
    let count = stream.read_u32("animation count")?;
    let mut animations = Vec::new();
    for _ in 0..count {
        animations.push(Animation::read(stream)?);
    }
    Ok(animations)
}

impl Animation {
    fn read<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<Self> {
        let id = stream.read_string("animation id")?;
        let channel_count = stream.read_u32("animation channel count")?;
        let mut channels = Vec::new();
        for _ in 0..channel_count {
            channels.push(AnimationChannel::read(stream)?);
        }
        Ok(Self { id, channels })
    }
}

impl AnimationChannel {
    fn read<R: Read + Seek>(stream: &mut BundleStream<R>) -> Result<Self> {
        let target_id = stream.read_string("animation target id")?;
        let target_attribute = stream.read_u32("animation target attribute")?;
        let key_times = read_u32_list(stream, "key times")?;
        let values = read_f32_list(stream, "key values")?;
        let tangents_in = read_f32_list(stream, "tangents in")?;
        let tangents_out = read_f32_list(stream, "tangents out")?;
        let interpolation = read_u32_list(stream, "interpolation")?;
        Ok(Self {
            target_id,
            target_attribute,
            key_times,
            values,
            tangents_in,
            tangents_out,
            interpolation,
        })
    }
}

fn read_u32_list<R: Read + Seek>(stream: &mut BundleStream<R>, what: &'static str) -> Result<Vec<u32>> {
    let count = stream.read_u32(what)?;
    stream.read_u32_array(count, what)
}

fn read_f32_list<R: Read + Seek>(stream: &mut BundleStream<R>, what: &'static str) -> Result<Vec<f32>> {
    let count = stream.read_u32(what)?;
    stream.read_f32_array(u64::from(count), what)
}
