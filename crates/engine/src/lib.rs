pub mod clipboard;
pub mod cursor;
pub mod display;
pub mod editor;
pub mod error;
pub mod events;
pub mod fill;
pub mod history;
pub mod pool;
pub mod projection;
pub mod selection;
pub mod table;
pub mod value;
pub mod viewport;

pub use clipboard::{Clipboard, ClipboardMetadata, MemoryClipboard};
pub use cursor::Cursor;
pub use display::{DisplayEvent, DisplayTable};
pub use editor::{EditorEvent, TableEditor};
pub use error::TableError;
pub use events::TableEvent;
pub use fill::{FillError, FillProgress, RecordSource, TableFill};
pub use pool::{Pool, PoolKey};
pub use projection::{SortDirection, SortOrder};
pub use selection::Selection;
pub use table::{SharedTable, Table};
pub use value::{Row, Value};
pub use viewport::{RenderReport, TableRenderer, Viewport};
