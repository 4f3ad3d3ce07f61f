use strum_macros::Display;

/// Type name for variables without a declared type.
pub const UNKNOWN_TYPE: &str = "Unknown";

/// Class of a variable as reported by `pldbg_get_variables`.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum VarClass {
    #[strum(serialize = "argument")]
    Argument,
    #[strum(serialize = "local")]
    Local,
    /// Any other class code, never shown as argument or local.
    #[strum(serialize = "other({0})")]
    Other(String),
}

impl VarClass {
    pub fn from_code(code: &str) -> Self {
        match code {
            "A" => VarClass::Argument,
            "L" => VarClass::Local,
            other => VarClass::Other(other.to_string()),
        }
    }
}

/// A variable visible in the current frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRecord {
    name: String,
    class: VarClass,
    declaration_line: i32,
    is_unique: bool,
    is_constant: bool,
    is_not_null: bool,
    declared_type_id: i64,
    value: String,
    resolved_type_name: String,
}

impl VariableRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        class: VarClass,
        declaration_line: i32,
        is_unique: bool,
        is_constant: bool,
        is_not_null: bool,
        declared_type_id: i64,
        value: impl Into<String>,
        resolved_type_name: Option<String>,
    ) -> Self {
        // a zero type id never carries a resolved name
        let resolved_type_name = match resolved_type_name {
            Some(name) if declared_type_id != 0 => name,
            _ => UNKNOWN_TYPE.to_string(),
        };

        Self {
            name: name.into(),
            class,
            declaration_line,
            is_unique,
            is_constant,
            is_not_null,
            declared_type_id,
            value: value.into(),
            resolved_type_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> &VarClass {
        &self.class
    }

    pub fn declaration_line(&self) -> i32 {
        self.declaration_line
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    pub fn is_constant(&self) -> bool {
        self.is_constant
    }

    pub fn is_not_null(&self) -> bool {
        self.is_not_null
    }

    pub fn declared_type_id(&self) -> i64 {
        self.declared_type_id
    }

    /// Textual rendering of the value.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn resolved_type_name(&self) -> &str {
        &self.resolved_type_name
    }
}
