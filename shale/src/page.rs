//! The slotted heap page layout.

use crate::config;
use crate::error::{DbError, DbResult};
use crate::transaction::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};

/// A page address: owning table plus zero-based page index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapPageId {
    pub table_id: u32,
    pub page_no: usize,
}

impl HeapPageId {
    pub fn new(table_id: u32, page_no: usize) -> Self {
        Self { table_id, page_no }
    }
}

/// In-memory image of one fixed-size disk block.
///
/// On disk a page is a used-slot bitmap followed by packed fixed-width
/// tuples; trailing padding is zeroed. The slot count is determined solely
/// by the owning table's tuple width: each tuple costs its byte width plus
/// one header bit.
#[derive(Debug, Clone)]
pub struct HeapPage {
    id: HeapPageId,
    desc: TupleDesc,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
    before_image: Vec<u8>,
}

/// Tuples that fit on one page of `desc` rows under the current page size.
pub fn slots_per_page(desc: &TupleDesc) -> usize {
    (config::page_size() * 8) / (desc.byte_len() * 8 + 1)
}

fn header_len(slots: usize) -> usize {
    slots.div_ceil(8)
}

impl HeapPage {
    /// Parses a page image. `data` must be exactly the configured page size.
    pub fn new(id: HeapPageId, desc: TupleDesc, data: &[u8]) -> DbResult<Self> {
        let page_size = config::page_size();
        if data.len() != page_size {
            return Err(DbError::invalid(format!(
                "page image is {} bytes, expected {}",
                data.len(),
                page_size
            )));
        }

        let slots = slots_per_page(&desc);
        let header = data[..header_len(slots)].to_vec();
        let width = desc.byte_len();
        let mut tuples = Vec::with_capacity(slots);
        for slot in 0..slots {
            if header[slot / 8] & (1 << (slot % 8)) != 0 {
                let offset = header.len() + slot * width;
                let mut t = Tuple::parse(&desc, &data[offset..offset + width])?;
                t.set_record_id(Some(RecordId::new(id, slot)));
                tuples.push(Some(t));
            } else {
                tuples.push(None);
            }
        }

        Ok(Self {
            id,
            desc,
            header,
            tuples,
            dirtied_by: None,
            before_image: data.to_vec(),
        })
    }

    /// An all-zero page image of the configured size.
    pub fn empty_page_data() -> Vec<u8> {
        vec![0; config::page_size()]
    }

    /// Serializes the page back to exactly the configured page size.
    pub fn page_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(config::page_size());
        out.extend_from_slice(&self.header);
        let width = self.desc.byte_len();
        for slot in &self.tuples {
            match slot {
                Some(t) => t.serialize(&mut out),
                None => out.resize(out.len() + width, 0),
            }
        }
        out.resize(config::page_size(), 0);
        out
    }

    pub fn id(&self) -> HeapPageId {
        self.id
    }

    pub fn desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.tuples.get(slot).map(Option::is_some).unwrap_or(false)
    }

    pub fn empty_slots(&self) -> usize {
        self.tuples.iter().filter(|t| t.is_none()).count()
    }

    /// Stores `t` in the first free slot and stamps its record id.
    pub fn insert_tuple(&mut self, t: &mut Tuple) -> DbResult<()> {
        if *t.desc() != self.desc {
            return Err(DbError::invalid("tuple schema does not match this page"));
        }
        let Some(slot) = self.tuples.iter().position(Option::is_none) else {
            return Err(DbError::invalid("page is full"));
        };
        t.set_record_id(Some(RecordId::new(self.id, slot)));
        self.header[slot / 8] |= 1 << (slot % 8);
        self.tuples[slot] = Some(t.clone());
        Ok(())
    }

    /// Clears the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, t: &Tuple) -> DbResult<()> {
        let rid = t
            .record_id()
            .ok_or_else(|| DbError::invalid("tuple has no record id"))?;
        if rid.page_id != self.id {
            return Err(DbError::invalid("tuple is not on this page"));
        }
        if rid.slot >= self.tuples.len() || self.tuples[rid.slot].is_none() {
            return Err(DbError::invalid("slot is already empty"));
        }
        self.header[rid.slot / 8] &= !(1 << (rid.slot % 8));
        self.tuples[rid.slot] = None;
        Ok(())
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().filter_map(Option::as_ref)
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtied_by = tid;
    }

    /// The transaction that dirtied this page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    /// The page image as of the last load or flush. WAL undo hook.
    pub fn before_image_data(&self) -> &[u8] {
        &self.before_image
    }

    /// Adopts the current contents as the new before-image. Called after a
    /// successful flush.
    pub fn set_before_image(&mut self) {
        self.before_image = self.page_data();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::tuple::{DataType, Field};
    use serial_test::serial;

    fn four_ints() -> TupleDesc {
        TupleDesc::new(vec![DataType::Int; 4])
    }

    fn int_tuple(desc: &TupleDesc, base: i32) -> Tuple {
        let fields = (0..desc.num_fields() as i32)
            .map(|i| Field::Int(base + i))
            .collect();
        Tuple::new(desc.clone(), fields).unwrap()
    }

    #[test]
    #[serial]
    fn slot_math_for_small_pages() {
        config::set_page_size(64);
        // 16-byte tuples: floor(64 * 8 / (16 * 8 + 1)) = 3 slots, 1 header byte.
        assert_eq!(slots_per_page(&four_ints()), 3);
        config::reset_page_size();
    }

    #[test]
    #[serial]
    fn insert_until_full_then_reject() {
        config::set_page_size(64);
        let desc = four_ints();
        let pid = HeapPageId::new(1, 0);
        let mut page = HeapPage::new(pid, desc.clone(), &HeapPage::empty_page_data()).unwrap();
        assert_eq!(page.empty_slots(), 3);

        for i in 0..3 {
            let mut t = int_tuple(&desc, i * 10);
            page.insert_tuple(&mut t).unwrap();
            assert_eq!(t.record_id().unwrap().slot, i as usize);
        }
        assert_eq!(page.empty_slots(), 0);

        let mut overflow = int_tuple(&desc, 99);
        assert!(matches!(
            page.insert_tuple(&mut overflow),
            Err(DbError::Invalid(_))
        ));
        config::reset_page_size();
    }

    #[test]
    #[serial]
    fn occupied_count_matches_header_popcount() {
        config::set_page_size(64);
        let desc = four_ints();
        let mut page = HeapPage::new(
            HeapPageId::new(1, 0),
            desc.clone(),
            &HeapPage::empty_page_data(),
        )
        .unwrap();
        let mut a = int_tuple(&desc, 0);
        let mut b = int_tuple(&desc, 100);
        page.insert_tuple(&mut a).unwrap();
        page.insert_tuple(&mut b).unwrap();
        page.delete_tuple(&a).unwrap();

        let popcount: u32 = page.header.iter().map(|b| b.count_ones()).sum();
        assert_eq!(popcount as usize, page.iter().count());
        assert_eq!(page.iter().count(), 1);
        config::reset_page_size();
    }

    #[test]
    #[serial]
    fn serialization_round_trips() {
        config::set_page_size(64);
        let desc = four_ints();
        let pid = HeapPageId::new(7, 3);
        let mut page = HeapPage::new(pid, desc.clone(), &HeapPage::empty_page_data()).unwrap();
        let mut t = int_tuple(&desc, -5);
        page.insert_tuple(&mut t).unwrap();

        let data = page.page_data();
        assert_eq!(data.len(), config::page_size());
        let reparsed = HeapPage::new(pid, desc, &data).unwrap();
        assert_eq!(reparsed.page_data(), data);
        assert_eq!(reparsed.iter().count(), 1);
        assert_eq!(reparsed.iter().next().unwrap().field(0), &Field::Int(-5));
        config::reset_page_size();
    }

    #[test]
    #[serial]
    fn delete_rejects_foreign_and_empty_slots() {
        config::set_page_size(64);
        let desc = four_ints();
        let mut page = HeapPage::new(
            HeapPageId::new(1, 0),
            desc.clone(),
            &HeapPage::empty_page_data(),
        )
        .unwrap();

        let unstored = int_tuple(&desc, 1);
        assert!(page.delete_tuple(&unstored).is_err());

        let mut foreign = int_tuple(&desc, 2);
        foreign.set_record_id(Some(RecordId::new(HeapPageId::new(2, 0), 0)));
        assert!(page.delete_tuple(&foreign).is_err());

        let mut stored = int_tuple(&desc, 3);
        page.insert_tuple(&mut stored).unwrap();
        page.delete_tuple(&stored).unwrap();
        assert!(page.delete_tuple(&stored).is_err());
        config::reset_page_size();
    }

    #[test]
    #[serial]
    fn wrong_sized_image_is_rejected() {
        let desc = four_ints();
        let short = vec![0u8; config::page_size() - 1];
        assert!(HeapPage::new(HeapPageId::new(1, 0), desc, &short).is_err());
    }
}
