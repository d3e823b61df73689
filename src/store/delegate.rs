//! Reference-array delegates.
//!
//! Every parent page stores its outgoing references in one of two layouts:
//!
//! - **Direct**: up to `capacity` `(slot, reference)` entries kept sorted by
//!   slot. Cheap for sparse pages, which is how every trie page starts out
//!   since a key path allocates one reference at a time.
//! - **Bitmap**: a bitmap over all logical slots plus a compacted array with
//!   one reference per set bit. Serialized size grows with the number of set
//!   references, not with the fan-out.
//!
//! The logical length (fan-out) never changes; only the layout does. A direct
//! delegate is promoted to a bitmap delegate when a new slot would exceed its
//! capacity.

use crate::data::{Bitmap, DecodeError, PageReader, PageWriter};

use super::{DbError, PageReference, Result};

/// Tag byte of the direct layout.
pub const DIRECT_TAG: u8 = 0;
/// Tag byte of the bitmap layout.
pub const BITMAP_TAG: u8 = 1;

/// Outgoing references of a parent page.
#[derive(Clone, Debug, PartialEq)]
pub enum References {
    Direct(DirectReferences),
    Bitmap(BitmapReferences),
}

/// Small sorted array of `(slot, reference)` entries.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectReferences {
    fanout: usize,
    capacity: usize,
    entries: Vec<(u16, PageReference)>,
}

/// Bitmap-indexed compacted reference array.
#[derive(Clone, Debug, PartialEq)]
pub struct BitmapReferences {
    bitmap: Bitmap,
    references: Vec<PageReference>,
}

impl DirectReferences {
    fn position(&self, slot: usize) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&(slot as u16), |(s, _)| *s)
    }

    fn into_bitmap(self) -> BitmapReferences {
        let mut bitmap = Bitmap::new(self.fanout);
        let mut references = Vec::with_capacity(self.entries.len() + 1);
        for (slot, reference) in self.entries {
            bitmap.set(slot as usize);
            references.push(reference);
        }
        BitmapReferences { bitmap, references }
    }
}

impl References {
    /// Creates an empty direct delegate.
    ///
    /// `fanout` is the logical number of slots; `capacity` the number of
    /// entries the direct layout holds before promotion.
    pub fn new(fanout: usize, capacity: usize) -> Self {
        References::Direct(DirectReferences {
            fanout,
            capacity,
            entries: Vec::new(),
        })
    }

    /// Logical number of slots.
    pub fn fanout(&self) -> usize {
        match self {
            References::Direct(d) => d.fanout,
            References::Bitmap(b) => b.bitmap.len(),
        }
    }

    /// Number of populated slots.
    pub fn count(&self) -> usize {
        match self {
            References::Direct(d) => d.entries.len(),
            References::Bitmap(b) => b.references.len(),
        }
    }

    /// Returns true if no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Returns true for the bitmap layout.
    pub fn is_bitmap(&self) -> bool {
        matches!(self, References::Bitmap(_))
    }

    /// Layout tag written in front of the encoding.
    pub fn tag(&self) -> u8 {
        match self {
            References::Direct(_) => DIRECT_TAG,
            References::Bitmap(_) => BITMAP_TAG,
        }
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.fanout() {
            return Err(DbError::SlotOutOfRange {
                slot,
                fanout: self.fanout(),
            });
        }
        Ok(())
    }

    /// Reference at `slot`, if populated.
    pub fn get(&self, slot: usize) -> Option<&PageReference> {
        if slot >= self.fanout() {
            return None;
        }
        match self {
            References::Direct(d) => d.position(slot).ok().map(|i| &d.entries[i].1),
            References::Bitmap(b) => {
                if b.bitmap.get(slot) {
                    Some(&b.references[b.bitmap.rank(slot)])
                } else {
                    None
                }
            }
        }
    }

    /// Mutable reference at `slot`, if populated.
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut PageReference> {
        if slot >= self.fanout() {
            return None;
        }
        match self {
            References::Direct(d) => match d.position(slot) {
                Ok(i) => Some(&mut d.entries[i].1),
                Err(_) => None,
            },
            References::Bitmap(b) => {
                if b.bitmap.get(slot) {
                    let i = b.bitmap.rank(slot);
                    Some(&mut b.references[i])
                } else {
                    None
                }
            }
        }
    }

    /// Installs `reference` at `slot`, promoting the layout if needed.
    pub fn set_or_create_reference(&mut self, slot: usize, reference: PageReference) -> Result<()> {
        self.check_slot(slot)?;

        let needs_promotion = match self {
            References::Direct(d) => match d.position(slot) {
                Ok(i) => {
                    d.entries[i].1 = reference;
                    return Ok(());
                }
                Err(i) if d.entries.len() < d.capacity => {
                    d.entries.insert(i, (slot as u16, reference));
                    return Ok(());
                }
                Err(_) => true,
            },
            References::Bitmap(_) => false,
        };
        if needs_promotion {
            self.promote();
        }

        if let References::Bitmap(b) = self {
            let i = b.bitmap.rank(slot);
            if b.bitmap.get(slot) {
                b.references[i] = reference;
            } else {
                b.bitmap.set(slot);
                b.references.insert(i, reference);
            }
        }
        Ok(())
    }

    /// Returns the reference at `slot`, installing an unset one if absent.
    pub fn get_or_create_reference(&mut self, slot: usize) -> Result<&mut PageReference> {
        self.check_slot(slot)?;
        if self.get(slot).is_none() {
            self.set_or_create_reference(slot, PageReference::new())?;
        }
        let fanout = self.fanout();
        self.get_mut(slot)
            .ok_or(DbError::SlotOutOfRange { slot, fanout })
    }

    /// Converts a direct delegate into a bitmap delegate in place.
    fn promote(&mut self) {
        let placeholder = References::new(0, 0);
        if let References::Direct(d) = std::mem::replace(self, placeholder) {
            *self = References::Bitmap(d.into_bitmap());
        }
    }

    /// Populated slots with their references, in ascending slot order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (usize, &PageReference)> + '_> {
        match self {
            References::Direct(d) => Box::new(d.entries.iter().map(|(s, r)| (*s as usize, r))),
            References::Bitmap(b) => Box::new(b.bitmap.iter_ones().zip(b.references.iter())),
        }
    }

    /// Mutable access to every populated reference, in ascending slot order.
    pub fn iter_mut(&mut self) -> Box<dyn Iterator<Item = &mut PageReference> + '_> {
        match self {
            References::Direct(d) => Box::new(d.entries.iter_mut().map(|(_, r)| r)),
            References::Bitmap(b) => Box::new(b.references.iter_mut()),
        }
    }

    /// Writes the layout tag followed by the layout's encoding.
    pub fn encode(&self, w: &mut PageWriter) {
        w.put_u8(self.tag());
        match self {
            References::Direct(d) => {
                w.put_u8(d.entries.len() as u8);
                for (slot, reference) in &d.entries {
                    w.put_u16(*slot);
                    reference.encode(w);
                }
            }
            References::Bitmap(b) => {
                for word in b.bitmap.words() {
                    w.put_u64(*word);
                }
                for reference in &b.references {
                    reference.encode(w);
                }
            }
        }
    }

    /// Reads a delegate for a page with `fanout` slots.
    pub fn decode(
        r: &mut PageReader<'_>,
        fanout: usize,
        capacity: usize,
    ) -> std::result::Result<Self, DecodeError> {
        match r.get_u8()? {
            DIRECT_TAG => {
                let count = r.get_u8()? as usize;
                if count > capacity {
                    return Err(DecodeError::Malformed(format!(
                        "direct delegate holds {count} entries, capacity {capacity}"
                    )));
                }
                let mut entries: Vec<(u16, PageReference)> = Vec::with_capacity(count);
                for _ in 0..count {
                    let slot = r.get_u16()?;
                    if slot as usize >= fanout {
                        return Err(DecodeError::Malformed(format!(
                            "slot {slot} outside fan-out {fanout}"
                        )));
                    }
                    if entries.last().is_some_and(|(prev, _)| *prev >= slot) {
                        return Err(DecodeError::Malformed("unsorted direct delegate".into()));
                    }
                    entries.push((slot, PageReference::decode(r)?));
                }
                Ok(References::Direct(DirectReferences {
                    fanout,
                    capacity,
                    entries,
                }))
            }
            BITMAP_TAG => {
                let mut words = Vec::with_capacity(Bitmap::words_for(fanout));
                for _ in 0..Bitmap::words_for(fanout) {
                    words.push(r.get_u64()?);
                }
                let bitmap = Bitmap::from_words(words, fanout)
                    .ok_or_else(|| DecodeError::Malformed("bitmap exceeds fan-out".into()))?;
                let count = bitmap.count_ones();
                let mut references = Vec::with_capacity(count);
                for _ in 0..count {
                    references.push(PageReference::decode(r)?);
                }
                Ok(References::Bitmap(BitmapReferences { bitmap, references }))
            }
            tag => Err(DecodeError::InvalidTag { what: "delegate", tag }),
        }
    }
}
