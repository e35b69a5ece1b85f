//! The Foo model: one project directory of `*.foo` files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use handly_buffer::Snapshot;
use handly_model::{
	Body, BuildContext, Error, Handle, Model, ModelConfig, ModelManager, Result, SourceElementBody,
	TextRange,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::parser::{self, DeclarationKind};
use crate::{FOO_DEF, FOO_FILE, FOO_PROJECT, FOO_VAR, PARAMETERS, PROBLEMS};

/// File extension of Foo source files.
pub const EXTENSION: &str = "foo";

/// Builds Foo elements from a directory on disk.
#[derive(Debug)]
pub struct FooModel {
	root: PathBuf,
	project: Handle,
}

impl FooModel {
	/// Creates a model over the project directory `root`.
	pub fn new(root: impl Into<PathBuf>) -> Self {
		let root = root.into();
		let name = root
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| "project".to_string());
		Self {
			project: Handle::root(FOO_PROJECT, name),
			root,
		}
	}

	/// Opens a model over `root` and returns the manager driving it.
	pub fn open(root: impl Into<PathBuf>, config: ModelConfig) -> Result<(Arc<Self>, ModelManager)> {
		let model = Arc::new(Self::new(root));
		let manager = ModelManager::new(Arc::clone(&model) as Arc<dyn Model>, config)?;
		Ok((model, manager))
	}

	/// Returns the project directory.
	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Returns the project handle.
	pub fn project(&self) -> &Handle {
		&self.project
	}

	/// Returns the handle of the source file `name` in the project.
	pub fn file(&self, name: &str) -> Handle {
		self.project.child(FOO_FILE, name)
	}

	/// Returns the path of a project or file handle.
	pub fn path_of(&self, element: &Handle) -> Option<PathBuf> {
		if element.kind() == FOO_PROJECT {
			return Some(self.root.clone());
		}
		if element.kind() == FOO_FILE {
			return Some(self.root.join(element.name()?));
		}
		None
	}

	fn build_project(&self, project: &Handle, ctx: &mut BuildContext<'_>) -> Result<()> {
		let entries = fs::read_dir(&self.root).map_err(|error| Error::Io {
			path: self.root.clone(),
			error,
		})?;
		let mut names: Vec<String> = entries
			.filter_map(std::result::Result::ok)
			.filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
			.filter_map(|entry| {
				let path = entry.path();
				if path.extension()? != EXTENSION {
					return None;
				}
				path.file_name()?.to_str().map(str::to_owned)
			})
			.collect();
		names.sort();
		trace!(project = %project, files = names.len(), "Built project");
		let files = names.iter().map(|name| project.child(FOO_FILE, name.as_str()));
		ctx.put(project.clone(), Body::with_children(files));
		Ok(())
	}

	fn build_file(&self, file: &Handle, ctx: &mut BuildContext<'_>) -> Result<()> {
		let snapshot = match ctx.snapshot() {
			Some(snapshot) => snapshot.clone(),
			None => {
				let path = self.path_of(file).ok_or_else(|| Error::DoesNotExist(file.clone()))?;
				let text = fs::read_to_string(&path).map_err(|error| Error::Io { path, error })?;
				Snapshot::detached(text)
			}
		};
		let parsed = parser::parse(&snapshot.contents());

		let mut file_body = SourceElementBody::new();
		let mut occurrences: FxHashMap<(&'static str, String), u32> = FxHashMap::default();
		for declaration in parsed.declarations {
			ctx.check_canceled()?;
			let (kind, name) = match &declaration.kind {
				DeclarationKind::Var => (FOO_VAR, declaration.name.clone()),
				DeclarationKind::Def { parameters } => {
					(FOO_DEF, format!("{}/{}", declaration.name, parameters.len()))
				}
			};
			let occurrence = occurrences.entry((kind.name(), name.clone())).or_insert(0);
			*occurrence += 1;
			let element = file.child_occurrence(kind, name, *occurrence);

			let mut body = SourceElementBody::new();
			body.set_full_range(declaration.full_range);
			body.set_identifying_range(declaration.name_range);
			body.set_snapshot(snapshot.clone());
			if let DeclarationKind::Def { parameters } = declaration.kind {
				body.set(&PARAMETERS, parameters);
			}
			file_body.add_child(element.clone());
			ctx.put(element, body);
		}

		if !parsed.problems.is_empty() {
			debug!(file = %file, problems = parsed.problems.len(), "Syntax errors");
		}
		file_body.set(&PROBLEMS, parsed.problems.len() as i64);
		file_body.set_full_range(TextRange::new(0, snapshot.len_chars()));
		file_body.set_snapshot(snapshot);
		ctx.put(file.clone(), file_body);
		Ok(())
	}
}

impl Model for FooModel {
	fn validate_existence(&self, element: &Handle) -> Result<()> {
		let exists = if element.kind() == FOO_PROJECT {
			self.root.is_dir()
		} else if element.kind() == FOO_FILE {
			self.path_of(element).is_some_and(|p| p.is_file())
				&& Path::new(element.name().unwrap_or_default())
					.extension()
					.is_some_and(|e| e == EXTENSION)
		} else {
			true
		};
		if exists {
			Ok(())
		} else {
			Err(Error::DoesNotExist(element.clone()))
		}
	}

	fn build_structure(&self, element: &Handle, ctx: &mut BuildContext<'_>) -> Result<()> {
		if element.kind() == FOO_PROJECT {
			self.build_project(element, ctx)
		} else if element.kind() == FOO_FILE {
			self.build_file(element, ctx)
		} else {
			Err(Error::IllegalArgument(format!("{element:?} is not openable")))
		}
	}
}
