//! Static export discovery.
//!
//! Story modules are parsed with oxc and never executed. Only top-level
//! module declarations are inspected.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{Declaration, ExportDefaultDeclarationKind, ModuleExportName, Statement};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use serde::Serialize;

/// A component symbol exported from a story module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSymbol {
    /// Exported name (the local name for default exports when known)
    pub symbol: String,

    /// Whether this is the module's default export
    pub is_default_export: bool,

    /// Byte offset of the declaring statement
    #[serde(skip)]
    pub position: u32,
}

/// Exports and imports of a single module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleSummary {
    /// Exported component symbols in declaration order
    pub exports: Vec<ExportSymbol>,

    /// Import and re-export specifiers in source order
    pub imports: Vec<String>,
}

/// Errors that can occur when analyzing a module.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

/// Parse a module and collect its exports and import specifiers.
///
/// With a `marker`, only exports whose leading comment contains it are kept.
/// Type-only exports are never components and are skipped.
pub fn analyze_module(
    source: &str,
    path: &Path,
    marker: Option<&str>,
) -> Result<ModuleSummary, ExportError> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::tsx());
    let ret = Parser::new(&allocator, source, source_type).parse();

    if !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ExportError::Parse {
            path: path.display().to_string(),
            message,
        });
    }

    let mut summary = ModuleSummary::default();
    let mut previous_end = 0u32;

    for stmt in &ret.program.body {
        let leading_start = previous_end;
        previous_end = stmt.span().end;

        match stmt {
            Statement::ImportDeclaration(decl) => {
                summary.imports.push(decl.source.value.to_string());
            }

            Statement::ExportAllDeclaration(decl) => {
                summary.imports.push(decl.source.value.to_string());
            }

            Statement::ExportNamedDeclaration(decl) => {
                if let Some(from) = &decl.source {
                    summary.imports.push(from.value.to_string());
                }

                let marked = is_marked(source, leading_start, decl.span.start, marker);
                if !marked || decl.export_kind.is_type() {
                    continue;
                }

                if let Some(declaration) = &decl.declaration {
                    for name in declared_names(declaration) {
                        summary.exports.push(ExportSymbol {
                            symbol: name,
                            is_default_export: false,
                            position: decl.span.start,
                        });
                    }
                }

                for spec in &decl.specifiers {
                    if spec.export_kind.is_type() {
                        continue;
                    }
                    let exported = export_name(&spec.exported);
                    let is_default = exported == "default";
                    summary.exports.push(ExportSymbol {
                        symbol: if is_default {
                            export_name(&spec.local)
                        } else {
                            exported
                        },
                        is_default_export: is_default,
                        position: spec.span.start,
                    });
                }
            }

            Statement::ExportDefaultDeclaration(decl) => {
                let marked = is_marked(source, leading_start, decl.span.start, marker);
                if !marked {
                    continue;
                }

                let symbol = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        func.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        class.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::Identifier(ident) => Some(ident.name.to_string()),
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => continue,
                    _ => None,
                };

                summary.exports.push(ExportSymbol {
                    symbol: symbol.unwrap_or_else(|| "default".to_string()),
                    is_default_export: true,
                    position: decl.span.start,
                });
            }

            _ => {}
        }
    }

    summary.exports.sort_by_key(|e| e.position);
    Ok(summary)
}

/// Names bound by an exported declaration that can be components.
fn declared_names(declaration: &Declaration) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .filter_map(|d| d.id.get_identifier_name())
            .map(|name| name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    }
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

/// Whether the text leading up to a statement carries the marker.
fn is_marked(source: &str, from: u32, to: u32, marker: Option<&str>) -> bool {
    let Some(marker) = marker else {
        return true;
    };
    source
        .get(from as usize..to as usize)
        .is_some_and(|leading| leading.contains(marker))
}
