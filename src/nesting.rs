//! Comment nesting reconstruction: rebuild every comment's depth in its reply
//! tree from flat records that only carry a parent reference.

use crate::record::{classify_parent, ParentLink};
use ahash::AHashMap;
use thiserror::Error;

/// Depth per comment id. 0 = direct reply to the post.
pub type DepthMap = AHashMap<String, u32>;

/// Anything that can take part in a nesting pass.
pub trait Nested {
    fn id(&self) -> &str;
    /// Raw prefixed reference (`t3_<post>` or `t1_<comment>`).
    fn parent_ref(&self) -> &str;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NestingError {
    #[error("comment {id} replies to {parent}, which is not in the batch")]
    OrphanReference { id: String, parent: String },

    #[error("reply chain through comment {id} loops back on itself")]
    CycleDetected { id: String },
}

#[derive(Clone, Copy)]
enum Slot {
    Visiting,
    Done(u32),
}

/// Resolve the depth of every record in one batch.
///
/// The batch may be in any order; a reply can appear before its parent. Every
/// non-root parent must be present in the batch, and the reply graph must be a
/// tree, otherwise the pass fails instead of guessing a depth.
pub fn resolve_depths<R: Nested>(records: &[R]) -> Result<DepthMap, NestingError> {
    let mut parent_of: AHashMap<&str, ParentLink<'_>> = AHashMap::with_capacity(records.len());
    for r in records {
        parent_of.insert(r.id(), classify_parent(r.parent_ref()));
    }

    let mut memo: AHashMap<&str, Slot> = AHashMap::with_capacity(parent_of.len());
    for r in records {
        resolve_one(r.id(), &parent_of, &mut memo)?;
    }

    let mut out = DepthMap::with_capacity(memo.len());
    for (id, slot) in memo {
        if let Slot::Done(d) = slot {
            out.insert(id.to_string(), d);
        }
    }
    Ok(out)
}

/// Walk up from `start` until a memoized ancestor (or the root) is found, then
/// unwind the collected chain assigning depths on the way down.
fn resolve_one<'a>(
    start: &'a str,
    parent_of: &AHashMap<&'a str, ParentLink<'a>>,
    memo: &mut AHashMap<&'a str, Slot>,
) -> Result<u32, NestingError> {
    if let Some(Slot::Done(d)) = memo.get(start) {
        return Ok(*d);
    }
    let mut chain: Vec<&'a str> = Vec::new();
    let mut cur = start;

    let base = loop {
        match memo.get(cur) {
            Some(Slot::Done(d)) => break Some(*d),
            Some(Slot::Visiting) => {
                return Err(NestingError::CycleDetected { id: cur.to_string() });
            }
            None => {}
        }
        memo.insert(cur, Slot::Visiting);
        chain.push(cur);

        match parent_of.get(cur) {
            Some(ParentLink::Root) => break None,
            Some(&ParentLink::Comment(parent)) => {
                if !parent_of.contains_key(parent) {
                    return Err(NestingError::OrphanReference {
                        id: cur.to_string(),
                        parent: parent.to_string(),
                    });
                }
                cur = parent;
            }
            // `cur` is always a batch id: the start, or a parent checked above.
            None => break None,
        }
    };

    // `base` is the depth of the first already-known ancestor; None means the
    // last element of the chain hangs directly off the post.
    let mut depth = match base {
        Some(d) => d + 1,
        None => 0,
    };
    // `chain[0]` is `start`, the deepest link.
    let start_depth = depth + (chain.len() as u32 - 1);
    while let Some(id) = chain.pop() {
        memo.insert(id, Slot::Done(depth));
        depth += 1;
    }
    Ok(start_depth)
}

impl<T: Nested + ?Sized> Nested for &T {
    fn id(&self) -> &str { (**self).id() }
    fn parent_ref(&self) -> &str { (**self).parent_ref() }
}
