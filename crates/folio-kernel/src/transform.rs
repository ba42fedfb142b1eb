//! Dialogue classification and bulk-transform planning.
//!
//! Every bulk transform is computed as a *plan*: a list of [`Slot`]s that
//! says, position by position, which existing block survives and where a
//! fresh empty block goes. Plans are pure functions of the block contents;
//! the block store applies them and renumbers `order` sequentially.

use strum::EnumString;

/// Three-way block classification used by dialogue spacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockClass {
    Dialogue,
    Narrative,
    Empty,
}

/// Dialogue open/close markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueMarkers {
    pub open: String,
    pub close: String,
}

impl Default for DialogueMarkers {
    fn default() -> Self {
        Self::new("「", "」")
    }
}

impl DialogueMarkers {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    /// Trimmed content starts with the open marker and ends with the close marker.
    pub fn is_dialogue(&self, content: &str) -> bool {
        let trimmed = content.trim();
        trimmed.starts_with(&self.open) && trimmed.ends_with(&self.close)
    }

    pub fn classify(&self, content: &str) -> BlockClass {
        if content.trim().is_empty() {
            BlockClass::Empty
        } else if self.is_dialogue(content) {
            BlockClass::Dialogue
        } else {
            BlockClass::Narrative
        }
    }
}

/// One position of a transform plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Keep the block at this index of the input.
    Keep(usize),
    /// A new empty block.
    Blank,
}

/// `formatDialogueSpacing` mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SpacingMode {
    Add,
    Remove,
}

fn is_empty(content: &str) -> bool {
    content.trim().is_empty()
}

/// An empty block between every adjacent pair of non-empty blocks.
pub fn blank_lines_between<S: AsRef<str>>(contents: &[S]) -> Vec<Slot> {
    let mut plan = Vec::with_capacity(contents.len() * 2);
    for (i, content) in contents.iter().enumerate() {
        if i > 0 && !is_empty(contents[i - 1].as_ref()) && !is_empty(content.as_ref()) {
            plan.push(Slot::Blank);
        }
        plan.push(Slot::Keep(i));
    }
    plan
}

/// Drop every block whose trimmed content is empty.
pub fn without_empty<S: AsRef<str>>(contents: &[S]) -> Vec<Slot> {
    keep_where(contents, |c| !is_empty(c))
}

/// Drop every dialogue block.
pub fn without_dialogue<S: AsRef<str>>(contents: &[S], markers: &DialogueMarkers) -> Vec<Slot> {
    keep_where(contents, |c| !markers.is_dialogue(c))
}

/// Drop every narrative block (anything that is not dialogue, empties included).
pub fn without_narrative<S: AsRef<str>>(contents: &[S], markers: &DialogueMarkers) -> Vec<Slot> {
    keep_where(contents, |c| markers.is_dialogue(c))
}

fn keep_where<S: AsRef<str>>(contents: &[S], keep: impl Fn(&str) -> bool) -> Vec<Slot> {
    contents
        .iter()
        .enumerate()
        .filter(|(_, c)| keep(c.as_ref()))
        .map(|(i, _)| Slot::Keep(i))
        .collect()
}

fn is_boundary(a: BlockClass, b: BlockClass) -> bool {
    matches!(
        (a, b),
        (BlockClass::Dialogue, BlockClass::Narrative) | (BlockClass::Narrative, BlockClass::Dialogue)
    )
}

/// Add or remove empty blocks at dialogue/narrative boundaries.
///
/// `Add` puts one empty block between every directly adjacent
/// dialogue/narrative pair. `Remove` deletes a whole run of empty blocks
/// when the nearest non-empty blocks on both sides form such a pair; runs
/// at either edge of the chapter are kept.
pub fn dialogue_spacing<S: AsRef<str>>(
    contents: &[S],
    markers: &DialogueMarkers,
    mode: SpacingMode,
) -> Vec<Slot> {
    let classes: Vec<BlockClass> = contents.iter().map(|c| markers.classify(c.as_ref())).collect();

    match mode {
        SpacingMode::Add => {
            let mut plan = Vec::with_capacity(classes.len() * 2);
            for i in 0..classes.len() {
                if i > 0 && is_boundary(classes[i - 1], classes[i]) {
                    plan.push(Slot::Blank);
                }
                plan.push(Slot::Keep(i));
            }
            plan
        }
        SpacingMode::Remove => {
            let mut plan = Vec::with_capacity(classes.len());
            let mut i = 0;
            while i < classes.len() {
                if classes[i] != BlockClass::Empty {
                    plan.push(Slot::Keep(i));
                    i += 1;
                    continue;
                }

                let start = i;
                while i < classes.len() && classes[i] == BlockClass::Empty {
                    i += 1;
                }
                // Run is start..i
                let drop_run = start > 0 && i < classes.len() && is_boundary(classes[start - 1], classes[i]);
                if !drop_run {
                    plan.extend((start..i).map(Slot::Keep));
                }
            }
            plan
        }
    }
}
