use serde::{Serialize, Deserialize};
use crate::Key;
use crate::runtime::definition::{BpmnElementType, ExecutableProcess, inner_instance_id};
use crate::runtime::records::MappingInstructionValue;

/// Maps an element of the source definition to an element of the target definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingInstruction {
    pub source_element_id: String,
    pub target_element_id: String,
}

impl MappingInstruction {
    pub fn new(source_element_id: impl Into<String>, target_element_id: impl Into<String>) -> Self {
        Self {
            source_element_id: source_element_id.into(),
            target_element_id: target_element_id.into(),
        }
    }
}

impl From<&MappingInstruction> for MappingInstructionValue {
    fn from(instruction: &MappingInstruction) -> Self {
        MappingInstructionValue {
            source_element_id: instruction.source_element_id.clone(),
            target_element_id: instruction.target_element_id.clone(),
        }
    }
}

/// 迁移命令：把一个运行中的流程实例迁移到目标流程定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCommand {
    pub process_instance_key: Key,
    pub target_process_definition_key: Key,
    #[serde(default)]
    pub mapping_instructions: Vec<MappingInstruction>,
}

impl MigrationCommand {
    pub fn new(process_instance_key: Key, target_process_definition_key: Key) -> Self {
        Self {
            process_instance_key,
            target_process_definition_key,
            mapping_instructions: Vec::new(),
        }
    }

    pub fn map(mut self, source_element_id: &str, target_element_id: &str) -> Self {
        self.mapping_instructions
            .push(MappingInstruction::new(source_element_id, target_element_id));
        self
    }
}

/// Adds `X#innerInstance → Y#innerInstance` for every mapping `X → Y` between two ad-hoc
/// sub-processes whose inner instance is not mapped explicitly. Other instructions pass
/// through untouched.
pub fn inject_ad_hoc_inner_instances(
    instructions: &[MappingInstruction],
    source: &ExecutableProcess,
    target: &ExecutableProcess,
) -> Vec<MappingInstruction> {
    let mut result = instructions.to_vec();
    for instruction in instructions {
        let is_ad_hoc = |process: &ExecutableProcess, id: &str| {
            process
                .element(id)
                .is_some_and(|e| e.element_type == BpmnElementType::AdHocSubProcess)
        };
        if !is_ad_hoc(source, &instruction.source_element_id) || !is_ad_hoc(target, &instruction.target_element_id) {
            continue;
        }

        let source_inner = inner_instance_id(&instruction.source_element_id);
        let already_mapped = instructions
            .iter()
            .any(|i| i.source_element_id == source_inner);
        if !already_mapped {
            result.push(MappingInstruction::new(
                source_inner,
                inner_instance_id(&instruction.target_element_id),
            ));
        }
    }
    result
}
