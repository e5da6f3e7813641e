//! Type definitions for worksheet data

/// A single cell value as read from a worksheet
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell (missing or no value)
    Empty,
    /// Text as stored in the sheet (shared, inline or raw value)
    String(String),
    /// Numeric value
    Float(f64),
}

impl CellValue {
    /// Build a cell from raw worksheet text, mapping "" to `Empty`
    pub fn from_raw(raw: String) -> Self {
        if raw.is_empty() {
            CellValue::Empty
        } else {
            CellValue::String(raw)
        }
    }

    /// Convert cell value to string
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Float(f) => f.to_string(),
        }
    }

    /// Check if cell is empty or whitespace only
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.trim().is_empty(),
            CellValue::Float(_) => false,
        }
    }

    /// Try to convert to float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            CellValue::String(s) => s.trim().parse().ok(),
            CellValue::Empty => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

/// Represents a row of cells
#[derive(Debug, Clone)]
pub struct Row {
    /// Row index (0-based, as addressed in the sheet)
    pub index: u32,
    /// Cells in this row
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Create a new row
    pub fn new(index: u32, cells: Vec<CellValue>) -> Self {
        Row { index, cells }
    }

    /// Row number as shown in Excel (1-based)
    pub fn number(&self) -> u32 {
        self.index + 1
    }

    /// Get cell at column index
    pub fn get(&self, col: usize) -> Option<&CellValue> {
        self.cells.get(col)
    }

    /// Check if row is empty
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }
}
