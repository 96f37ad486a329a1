use crate::error::{DbError, Result};
use crate::protocol::marshal;
use crate::protocol::{ParamDescriptor, ParamSlot, Value};

/// Parameter slots of a prepared command or procedure call.
#[derive(Debug, Default)]
pub struct ParamBinder {
    slots: Vec<ParamSlot>,
}

impl ParamBinder {
    pub fn new(descriptors: Vec<ParamDescriptor>) -> Self {
        Self {
            slots: descriptors.into_iter().map(ParamSlot::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Result<&ParamSlot> {
        self.slots.get(index).ok_or_else(|| out_of_range(index, self.slots.len()))
    }

    /// NULL with zero length; the buffer keeps its storage.
    pub fn set_null(&mut self, index: usize) -> Result<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
        slot.buffer.set_null();
        Ok(())
    }

    pub fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
        marshal::encode(slot, value)
    }
}

fn out_of_range(index: usize, len: usize) -> DbError {
    DbError::InvalidState(format!(
        "Parameter index {} out of range ({} parameter(s))",
        index, len
    ))
}
