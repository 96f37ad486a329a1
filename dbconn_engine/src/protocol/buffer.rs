use super::descriptor::{ColumnDescriptor, ParamDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Null,
    Value,
    /// The native layer had more bytes than the buffer could hold.
    Truncated,
}

/// One native value buffer: storage, the length actually used and a NULL indicator.
#[derive(Debug, Clone)]
pub struct ValueBuffer {
    data: Vec<u8>,
    length: usize,
    indicator: Indicator,
}

impl ValueBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            length: 0,
            indicator: Indicator::Null,
        }
    }

    pub fn for_column(column: &ColumnDescriptor) -> Self {
        Self::with_capacity(column.buffer_capacity())
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    pub fn is_null(&self) -> bool {
        self.indicator == Indicator::Null
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Copies `bytes` in, truncating to capacity.
    pub fn fill(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.data.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.length = n;
        self.indicator = if n < bytes.len() {
            Indicator::Truncated
        } else {
            Indicator::Value
        };
    }

    /// Copies `bytes` in, growing the storage when needed.
    pub fn fill_growing(&mut self, bytes: &[u8]) {
        if bytes.len() > self.data.len() {
            self.data.resize(bytes.len(), 0);
        }
        self.fill(bytes);
    }

    /// Marks the buffer NULL with zero length; the storage is kept.
    pub fn set_null(&mut self) {
        self.length = 0;
        self.indicator = Indicator::Null;
    }
}

/// A prepared command's parameter: descriptor plus value buffer.
#[derive(Debug, Clone)]
pub struct ParamSlot {
    pub descriptor: ParamDescriptor,
    pub buffer: ValueBuffer,
}

impl ParamSlot {
    pub fn new(descriptor: ParamDescriptor) -> Self {
        let buffer = ValueBuffer::for_column(&descriptor.column);
        Self { descriptor, buffer }
    }

    pub fn max_length(&self) -> usize {
        self.descriptor.column.max_length
    }
}
