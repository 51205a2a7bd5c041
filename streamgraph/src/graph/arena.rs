//! Slot storage for request nodes.
//!
//! The arena doubles as the recycling pool: released slots keep their
//! (reset) [`FileRequest`] and go onto a free list, and their generation is
//! bumped so stale [`RequestId`]s stop resolving.

use crate::request::{FileRequest, RequestId};

struct Slot {
    generation: u32,
    occupied: bool,
    request: FileRequest,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            generation: 0,
            occupied: false,
            request: FileRequest::default(),
        }
    }
}

pub(crate) struct RequestArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    recycled: u64,
}

impl RequestArena {
    /// Creates an arena with `capacity` pre-built vacant slots.
    pub fn with_capacity(capacity: usize) -> Self {
        let slots: Vec<Slot> = (0..capacity).map(|_| Slot::vacant()).collect();
        // Reverse so that slot 0 is handed out first.
        let free = (0..slots.len() as u32).rev().collect();
        Self {
            slots,
            free,
            live: 0,
            recycled: 0,
        }
    }

    /// Claims a vacant slot and returns its handle and fresh node.
    pub fn allocate(&mut self) -> (RequestId, &mut FileRequest) {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = match u32::try_from(self.slots.len()) {
                    Ok(index) => index,
                    Err(_) => panic!("request arena exhausted its index space"),
                };
                self.slots.push(Slot::vacant());
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(!slot.occupied && slot.request.is_fresh());
        slot.occupied = true;
        self.live += 1;
        (RequestId::new(index, slot.generation), &mut slot.request)
    }

    pub fn get(&self, id: RequestId) -> Option<&FileRequest> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.occupied && slot.generation == id.generation())
            .map(|slot| &slot.request)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut FileRequest> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.occupied && slot.generation == id.generation())
            .map(|slot| &mut slot.request)
    }

    /// Returns a reset slot to the free list. The node must already be fresh.
    pub fn release(&mut self, id: RequestId) -> bool {
        let Some(slot) = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.occupied && slot.generation == id.generation())
        else {
            return false;
        };
        debug_assert!(slot.request.is_fresh(), "released slot was not reset");
        slot.occupied = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.live -= 1;
        self.recycled += 1;
        true
    }

    /// Live requests with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (RequestId, &FileRequest)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.occupied)
            .map(|(index, slot)| (RequestId::new(index as u32, slot.generation), &slot.request))
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    pub fn recycled(&self) -> u64 {
        self.recycled
    }
}
