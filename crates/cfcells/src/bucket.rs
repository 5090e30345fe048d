use std::collections::HashMap;

use log::trace;

/// The faces of one cell that share a texture map id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBucket {
    /// None when the cell has no texture map ids.
    pub texture_id: Option<u32>,
    /// Triangle vertex indices, three per face.
    pub indices: Vec<u32>,
}

/// Groups faces by texture id, keeping buckets in the order their ids were first seen.
///
/// Runs of faces with the same id are common, so the last bucket used is cached and
/// consulted before the map.
#[derive(Debug, Default)]
pub struct FaceBuckets {
    buckets: Vec<TextureBucket>,
    by_texture: HashMap<Option<u32>, usize>,
    current: Option<(Option<u32>, usize)>,
}

impl FaceBuckets {
    pub fn new() -> FaceBuckets {
        FaceBuckets::default()
    }

    pub fn push(&mut self, texture_id: Option<u32>, face: [u32; 3]) {
        let slot = match self.current {
            Some((id, slot)) if id == texture_id => slot,
            _ => {
                let slot = match self.by_texture.get(&texture_id) {
                    Some(slot) => *slot,
                    None => {
                        trace!("New bucket {} for texture {:?}", self.buckets.len(), texture_id);
                        self.buckets.push(TextureBucket {
                            texture_id,
                            indices: Vec::new(),
                        });
                        self.by_texture.insert(texture_id, self.buckets.len() - 1);
                        self.buckets.len() - 1
                    }
                };
                self.current = Some((texture_id, slot));
                slot
            }
        };
        self.buckets[slot].indices.extend_from_slice(&face);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn into_buckets(self) -> Vec<TextureBucket> {
        self.buckets
    }
}
