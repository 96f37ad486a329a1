pub mod buffer;
pub mod datetime;
pub mod descriptor;
pub mod marshal;
pub mod numeric;
pub mod types;
pub mod value;

pub use buffer::{Indicator, ParamSlot, ValueBuffer};
pub use datetime::DateRec;
pub use descriptor::{AggregateOp, ColumnDescriptor, ColumnSet, ParamDescriptor, ParamDirection};
pub use types::{LogicalType, NativeType};
pub use value::{kind, Value};
