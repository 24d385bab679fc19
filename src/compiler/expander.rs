use crate::dsl::{ProcessModel, Element, ElementKind};
use crate::runtime::definition::inner_instance_id;
use anyhow::{Result, anyhow};

/// Rewrites the source model into the form the compiler indexes.
///
/// 目前只有一条规则：每个 ad-hoc 子流程拥有一个隐藏的内部实例作用域
/// (`<id>#innerInstance`)，原本直接位于 ad-hoc 子流程中的元素改为位于该作用域内。
pub struct Expander {}

impl Expander {
    pub fn new() -> Self {
        Self {}
    }

    pub fn expand(&self, model: ProcessModel) -> Result<ProcessModel> {
        let ad_hoc_ids: Vec<String> = model
            .elements
            .iter()
            .filter(|e| matches!(e.kind, ElementKind::AdHocSubProcess))
            .map(|e| e.id.clone())
            .collect();

        let mut new_elements = Vec::with_capacity(model.elements.len() + ad_hoc_ids.len());
        for element in model.elements {
            if matches!(element.kind, ElementKind::AdHocSubProcessInnerInstance) {
                return Err(anyhow!(
                    "Element '{}' uses an internal element type that cannot be declared",
                    element.id
                ));
            }
            let is_ad_hoc = matches!(element.kind, ElementKind::AdHocSubProcess);
            let ad_hoc_id = element.id.clone();
            new_elements.push(self.reparent(element, &ad_hoc_ids));
            if is_ad_hoc {
                self.expand_ad_hoc(&ad_hoc_id, &mut new_elements);
            }
        }

        Ok(ProcessModel {
            elements: new_elements,
            ..model
        })
    }

    fn expand_ad_hoc(&self, ad_hoc_id: &str, new_elements: &mut Vec<Element>) {
        new_elements.push(Element {
            id: inner_instance_id(ad_hoc_id),
            scope: Some(ad_hoc_id.to_string()),
            kind: ElementKind::AdHocSubProcessInnerInstance,
        });
    }

    fn reparent(&self, mut element: Element, ad_hoc_ids: &[String]) -> Element {
        if let Some(scope) = &element.scope {
            if ad_hoc_ids.contains(scope) {
                element.scope = Some(inner_instance_id(scope));
            }
        }
        element
    }
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}
