//! Contract ABI: methods, parameters and events.

use serde::{Deserialize, Serialize};

/// Parameter and return types as they appear in manifest JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    Any,
    Signature,
    Boolean,
    Integer,
    Hash160,
    Hash256,
    ByteArray,
    PublicKey,
    String,
    Array,
    Map,
    InteropInterface,
    Void,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
}

/// One exported method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMethod {
    /// Exported name.
    pub name: String,
    /// Declared parameters in order.
    pub parameters: Vec<ContractParameter>,
    /// Declared return type.
    #[serde(rename = "returntype")]
    pub return_type: ParameterType,
    /// Bytecode offset where the method starts.
    pub offset: u32,
    /// Safe methods may be called without write permissions.
    pub safe: bool,
}

/// One declared event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    /// Event name.
    pub name: String,
    /// Event parameters.
    pub parameters: Vec<ContractParameter>,
}

/// The ABI block of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractAbi {
    /// Exported methods.
    pub methods: Vec<ContractMethod>,
    /// Declared events.
    pub events: Vec<ContractEvent>,
}

impl Default for ParameterType {
    fn default() -> Self {
        ParameterType::Any
    }
}

impl ContractAbi {
    /// Finds a method by name and parameter count.
    pub fn get_method(&self, name: &str, parameter_count: usize) -> Option<&ContractMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.parameters.len() == parameter_count)
    }

    /// Finds a method by name alone (first match).
    pub fn get_method_by_name(&self, name: &str) -> Option<&ContractMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_lookup_by_arity() {
        let abi = ContractAbi {
            methods: vec![
                ContractMethod {
                    name: "transfer".into(),
                    parameters: vec![],
                    return_type: ParameterType::Boolean,
                    offset: 0,
                    safe: false,
                },
                ContractMethod {
                    name: "transfer".into(),
                    parameters: vec![ContractParameter {
                        name: "to".into(),
                        parameter_type: ParameterType::Hash160,
                    }],
                    return_type: ParameterType::Boolean,
                    offset: 10,
                    safe: false,
                },
            ],
            events: vec![],
        };
        assert_eq!(abi.get_method("transfer", 1).unwrap().offset, 10);
        assert!(abi.get_method("transfer", 2).is_none());
    }
}
