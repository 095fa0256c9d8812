//! avsync core - canonical table model for attribute views
//!
//! Pure, synchronous code with no I/O. Raw responses go in, a [`Table`]
//! comes out; user scalars go in, wire values come out. The async
//! orchestration lives in `avsync-client`.

pub mod assembly;
pub mod construction;
pub mod enums;
pub mod error;
pub mod filter;
pub mod model;
pub mod projection;
pub mod report;
pub mod shape;
pub mod task;
pub mod transport;

pub use assembly::{build_columns, build_table, build_views, extract_cell_id_and_value, find_cell};
pub use construction::{build_value, RelationEncoding};
pub use enums::ColumnType;
pub use error::{TransportError, ValidationError};
pub use filter::RowFilter;
pub use model::{Cell, Column, FieldUpdate, Row, Table, ViewInfo};
pub use projection::{display_text, extract_identifier, project_date, project_number, project_text};
pub use report::{is_done_status, ReportRange, ReportSummary};
pub use shape::{extract, extract_array, Extraction, ShapeTest, Strategy};
pub use task::{FieldRoles, RoleColumn, Task, TaskPatch, TaskRole};
pub use transport::{
    created_unit_id, AttachSource, ContentUnit, DetachedField, FieldWrite, NewColumn, RowQuery,
    Transport, WriteResponse,
};
