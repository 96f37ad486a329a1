use super::types::NativeType;
use std::collections::HashMap;

/// Metadata of one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub native_type: NativeType,
    pub max_length: usize,
    pub precision: u8,
    pub scale: u8,
    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, native_type: NativeType, max_length: usize) -> Self {
        Self {
            name: name.into(),
            native_type,
            max_length,
            precision: 0,
            scale: 0,
            nullable: true,
        }
    }

    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Buffer capacity for one value: fixed width when the layout has one,
    /// otherwise the declared maximum plus a terminator byte.
    pub fn buffer_capacity(&self) -> usize {
        match self.native_type.fixed_width() {
            Some(width) => width,
            None => self.max_length + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

impl ParamDirection {
    pub fn is_output(self) -> bool {
        matches!(self, ParamDirection::Out | ParamDirection::InOut)
    }
}

/// Metadata of one bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub column: ColumnDescriptor,
    pub direction: ParamDirection,
}

impl ParamDescriptor {
    pub fn new(column: ColumnDescriptor, direction: ParamDirection) -> Self {
        Self { column, direction }
    }

    pub fn input(name: impl Into<String>, native_type: NativeType, max_length: usize) -> Self {
        Self::new(
            ColumnDescriptor::new(name, native_type, max_length),
            ParamDirection::In,
        )
    }

    pub fn name(&self) -> &str {
        &self.column.name
    }

    pub fn native_type(&self) -> NativeType {
        self.column.native_type
    }
}

/// Operator of a compute (aggregate) result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    Unknown,
}

impl AggregateOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Unknown => "unknown",
        }
    }

    /// `count(txt)` for a count over base column `txt`.
    pub fn synthesize_name(self, base_column: &str) -> String {
        format!("{}({})", self.as_str(), base_column)
    }
}

/// Column descriptors of the visible result plus the name index.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<ColumnDescriptor>,
    index: HashMap<String, usize>,
}

impl ColumnSet {
    /// Builds the set; unnamed columns become `column<N>` (1-based) and the
    /// first column wins when names repeat.
    pub fn new(mut columns: Vec<ColumnDescriptor>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter_mut().enumerate() {
            if column.name.is_empty() {
                column.name = format!("column{}", i + 1);
            }
            index.entry(column.name.clone()).or_insert(i);
        }
        Self { columns, index }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter()
    }

    pub fn descriptors(&self) -> &[ColumnDescriptor] {
        &self.columns
    }
}
