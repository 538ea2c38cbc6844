use log::debug;

use crate::scopes::{UncheckedType, UncheckedTypeKind, UncheckedVar, UncheckedVarKind};

use super::Checker;

impl Checker<'_> {
    /// Phase 0: create one scope per module and enter every top-level
    /// declaration as an unchecked entry. No type checking happens here;
    /// this only establishes the name-to-declaration map and the scope
    /// graph.
    pub fn scope_setup_program(&mut self) {
        for module in &self.program.modules {
            let module_scope = self.scopes.new_module_scope(&module.decl.name);
            self.module_scopes
                .push((module.decl.name.clone(), module_scope));
        }

        for (index, module) in self.program.modules.iter().enumerate() {
            let module_scope = self.module_scopes[index].1;
            debug!("setting up scope for module '{}'", module.decl.name);

            for link in &module.linked_modules {
                let Some(target) = self.scopes.module_scope_by_name(&link.decl.name) else {
                    self.status.error(
                        link.token.location.clone(),
                        format!("linked module '{}' was not loaded", link.decl.name),
                    );
                    continue;
                };
                let alias = link
                    .link_as_name
                    .as_ref()
                    .map(|token| token.text.clone())
                    .unwrap_or_else(|| link.decl.name.clone());
                self.scopes.add_module_alias(module_scope, &alias, target);
            }

            for link in &module.linked_names {
                // the original left this unimplemented; reject it with a
                // located diagnostic rather than silently dropping it
                self.status.error(
                    link.token.location.clone(),
                    "link name is not implemented",
                );
            }

            for link in &module.linked_functions {
                self.link_functions.push((module_scope, link.clone()));
            }

            for function in &module.functions {
                self.scopes.add_unchecked_var(
                    module_scope,
                    UncheckedVar {
                        name: function.decl.name.clone(),
                        location: function.decl.token.location.clone(),
                        module_scope,
                        kind: UncheckedVarKind::Function(function.clone()),
                    },
                );
            }

            for type_def in &module.type_defs {
                self.scopes.add_unchecked_type(UncheckedType {
                    module_scope,
                    kind: UncheckedTypeKind::TypeDef(type_def.clone()),
                });
            }

            for tag in &module.tags {
                self.scopes.add_unchecked_type(UncheckedType {
                    module_scope,
                    kind: UncheckedTypeKind::Tag(tag.clone()),
                });
            }
        }
    }
}
