//! Abstract method signatures exported by plugins.
//!
//! A [`Method`] is the language-independent description of one callable: an
//! ordered parameter list, a return type, an optional calling-convention
//! tag, and an optional variadic-start index. The JIT layer turns these into
//! native trampolines; the plugin manager cross-checks them against what a
//! language module reports at load time.

use serde::{Deserialize, Serialize};

/// The type of a single parameter or return value.
///
/// Wire names follow the descriptor format: primitives are lowercase
/// (`"int32"`, `"double"`), pointers are `"ptr64"`, and array types append
/// `[]` to the element name (`"int32[]"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    #[serde(rename = "void")]
    Void,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "char8")]
    Char8,
    #[serde(rename = "char16")]
    Char16,
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    #[serde(rename = "ptr64", alias = "pointer")]
    Pointer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool[]")]
    ArrayBool,
    #[serde(rename = "char8[]")]
    ArrayChar8,
    #[serde(rename = "char16[]")]
    ArrayChar16,
    #[serde(rename = "int8[]")]
    ArrayInt8,
    #[serde(rename = "int16[]")]
    ArrayInt16,
    #[serde(rename = "int32[]")]
    ArrayInt32,
    #[serde(rename = "int64[]")]
    ArrayInt64,
    #[serde(rename = "uint8[]")]
    ArrayUInt8,
    #[serde(rename = "uint16[]")]
    ArrayUInt16,
    #[serde(rename = "uint32[]")]
    ArrayUInt32,
    #[serde(rename = "uint64[]")]
    ArrayUInt64,
    #[serde(rename = "ptr64[]")]
    ArrayPointer,
    #[serde(rename = "float[]")]
    ArrayFloat,
    #[serde(rename = "double[]")]
    ArrayDouble,
    #[serde(rename = "string[]")]
    ArrayString,
}

impl ValueType {
    /// `true` for types marshalled through general-purpose registers:
    /// booleans, characters, integers, pointers, and function pointers.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            ValueType::Bool
                | ValueType::Char8
                | ValueType::Char16
                | ValueType::Int8
                | ValueType::Int16
                | ValueType::Int32
                | ValueType::Int64
                | ValueType::UInt8
                | ValueType::UInt16
                | ValueType::UInt32
                | ValueType::UInt64
                | ValueType::Pointer
                | ValueType::Function
        )
    }

    /// `true` for types marshalled through SIMD registers.
    pub fn is_floating(self) -> bool {
        matches!(self, ValueType::Float | ValueType::Double)
    }

    /// `true` for array-of-primitive types.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            ValueType::ArrayBool
                | ValueType::ArrayChar8
                | ValueType::ArrayChar16
                | ValueType::ArrayInt8
                | ValueType::ArrayInt16
                | ValueType::ArrayInt32
                | ValueType::ArrayInt64
                | ValueType::ArrayUInt8
                | ValueType::ArrayUInt16
                | ValueType::ArrayUInt32
                | ValueType::ArrayUInt64
                | ValueType::ArrayPointer
                | ValueType::ArrayFloat
                | ValueType::ArrayDouble
                | ValueType::ArrayString
        )
    }

    /// `true` when a by-value parameter of this type does not fit into a
    /// single machine-pointer-sized slot. Such parameters must be passed by
    /// reference; the JIT rejects them otherwise.
    pub fn is_wider_than_pointer(self) -> bool {
        self == ValueType::String || self.is_array()
    }
}

/// One parameter or return slot: a value type plus a by-reference flag.
///
/// A by-reference parameter travels as a pointer regardless of its declared
/// element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(rename = "ref", default, skip_serializing_if = "is_false")]
    pub is_reference: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl Property {
    pub fn new(value_type: ValueType) -> Self {
        Property {
            value_type,
            is_reference: false,
        }
    }

    pub fn reference(value_type: ValueType) -> Self {
        Property {
            value_type,
            is_reference: true,
        }
    }
}

/// An exported method: its registry name, the symbol-level function name,
/// and the full signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Method {
    /// Name other plugins request this method by.
    pub name: String,
    /// Name of the function inside the owning plugin's language runtime.
    #[serde(default)]
    pub func_name: String,
    #[serde(default)]
    pub param_types: Vec<Property>,
    pub ret_type: Property,
    /// Calling-convention tag; `None` means the host default.
    #[serde(rename = "callConv", default, skip_serializing_if = "Option::is_none")]
    pub call_conv: Option<String>,
    /// Index of the first variadic argument, if the method is variadic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_index: Option<u8>,
}

impl Method {
    /// Builds a non-variadic method with the host calling convention.
    pub fn new(
        name: impl Into<String>,
        param_types: Vec<Property>,
        ret_type: Property,
    ) -> Self {
        let name = name.into();
        Method {
            func_name: name.clone(),
            name,
            param_types,
            ret_type,
            call_conv: None,
            var_index: None,
        }
    }
}
