use std::fmt::{self, Write as _};

use super::{DeltaFlags, ElementDelta};
use crate::elements;

const INDENT: &str = "  ";

/// Debug rendering of a delta tree.
///
/// One line per node, `Name[kind]: {FLAG|FLAG}`, children indented by two
/// spaces. Resource deltas follow the element children, sorted by path.
pub struct DeltaDisplay<'a> {
	delta: &'a ElementDelta,
	custom_flags: &'a [(DeltaFlags, &'static str)],
}

impl<'a> DeltaDisplay<'a> {
	pub(super) fn new(delta: &'a ElementDelta, custom_flags: &'a [(DeltaFlags, &'static str)]) -> Self {
		Self { delta, custom_flags }
	}

	fn write_node(&self, f: &mut fmt::Formatter<'_>, delta: &ElementDelta, depth: usize) -> fmt::Result {
		for _ in 0..depth {
			f.write_str(INDENT)?;
		}
		write!(f, "{}[{}]: {{", delta.element, delta.kind.symbol())?;
		self.write_flags(f, delta)?;
		f.write_char('}')?;

		for child in delta.children.values() {
			f.write_char('\n')?;
			self.write_node(f, child, depth + 1)?;
		}

		let mut resources: Vec<_> = delta.resource_deltas.iter().collect();
		resources.sort_by(|a, b| a.path().cmp(b.path()));
		for resource in resources {
			f.write_char('\n')?;
			for _ in 0..=depth {
				f.write_str(INDENT)?;
			}
			write!(f, "ResourceDelta({})[{}]", resource.path(), resource.kind().symbol())?;
		}
		Ok(())
	}

	fn write_flags(&self, f: &mut fmt::Formatter<'_>, delta: &ElementDelta) -> fmt::Result {
		let flags = delta.flags;
		let mut sep = "";
		let mut put = |f: &mut fmt::Formatter<'_>, token: &dyn fmt::Display| -> fmt::Result {
			write!(f, "{sep}{token}")?;
			sep = "|";
			Ok(())
		};

		if flags.contains(DeltaFlags::CHILDREN) {
			put(f, &"CHILDREN")?;
		}
		if flags.contains(DeltaFlags::CONTENT) {
			put(f, &"CONTENT")?;
		}
		if flags.contains(DeltaFlags::MOVED_TO) {
			let target = delta.moved_to.as_ref().map(elements::path).unwrap_or_default();
			put(f, &format_args!("MOVED_TO({target})"))?;
		}
		if flags.contains(DeltaFlags::MOVED_FROM) {
			let origin = delta.moved_from.as_ref().map(elements::path).unwrap_or_default();
			put(f, &format_args!("MOVED_FROM({origin})"))?;
		}
		const NAMED: [(DeltaFlags, &str); 8] = [
			(DeltaFlags::REORDER, "REORDERED"),
			(DeltaFlags::FINE_GRAINED, "FINE GRAINED"),
			(DeltaFlags::OPEN, "OPEN"),
			(DeltaFlags::DESCRIPTION, "DESCRIPTION"),
			(DeltaFlags::WORKING_COPY, "WORKING COPY"),
			(DeltaFlags::UNDERLYING_RESOURCE, "UNDERLYING_RESOURCE"),
			(DeltaFlags::MARKERS, "MARKERS"),
			(DeltaFlags::SYNC, "SYNC"),
		];
		for (flag, name) in NAMED {
			if flags.contains(flag) {
				put(f, &name)?;
			}
		}

		let mut remaining = flags.difference(DeltaFlags::all());
		for &(flag, name) in self.custom_flags {
			if !flag.is_empty() && remaining.contains(flag) {
				put(f, &name)?;
				remaining.remove(flag);
			}
		}
		let mut bits = remaining.bits();
		while bits != 0 {
			let bit = bits.trailing_zeros();
			put(f, &format_args!("FLAG({bit})"))?;
			bits &= bits - 1;
		}
		Ok(())
	}
}

impl fmt::Display for DeltaDisplay<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.write_node(f, self.delta, 0)
	}
}

impl fmt::Debug for DeltaDisplay<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}
