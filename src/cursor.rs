//! Lazy, batch-at-a-time iteration over the results of a query.
//!
//! A `Cursor` owns the buffered batch and the logical position within it;
//! `CursorIter` handles obtained from `begin`/`end` are lightweight views
//! of that shared position. Because the position is shared, every live
//! handle on one cursor stays in lockstep: advancing any handle advances
//! them all, and a handle that has run past the buffered batch compares
//! equal to the end sentinel until the next call to `begin` fetches more.
use bson;
use error::Error::ArgumentError;
use Result;
use std::cell::RefCell;
use std::rc::Rc;

pub const DEFAULT_BATCH_SIZE: i32 = 20;

/// Describes the type of cursor returned by a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CursorType {
    NonTailable,
    Tailable,
    TailableAwait,
}

impl Default for CursorType {
    fn default() -> Self {
        CursorType::NonTailable
    }
}

/// Exhaustion state of a cursor.
///
/// `Exhausted` only arises for tailable cursors: the buffered batch is used
/// up and the last fetch came back empty, but the server-side cursor is
/// still live, so a later fetch may find new documents. Non-tailable
/// cursors go straight from `Active` to `Dead`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    Active,
    Exhausted,
    Dead,
}

/// One chunk of documents returned by a single fetch, along with the
/// (possibly unchanged) server-side cursor id. A zero id signals that the
/// server has nothing further to offer.
#[derive(Clone, Debug)]
pub struct Batch {
    pub cursor_id: i64,
    pub documents: Vec<bson::Document>,
}

/// The server half of the cursor protocol.
///
/// Implementors perform the actual round trip for a getMore and own the
/// connection it travels on; the cursor holds an exclusive claim on that
/// connection for its lifetime.
pub trait BatchSource {
    /// Fetches the next batch for `cursor_id`, blocking until the server
    /// replies or the transport fails. For tailable-await cursors,
    /// `max_await_time_ms` bounds how long the server may hold the request
    /// open before replying with an empty batch.
    fn get_more(
        &mut self,
        cursor_id: i64,
        batch_size: i32,
        max_await_time_ms: Option<i64>,
    ) -> Result<Batch>;

    /// Releases the server-side cursor. Called when a cursor is dropped
    /// while its id is still live; failures are ignored.
    fn kill(&mut self, _cursor_id: i64) {}
}

/// Options governing cursor iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorOptions {
    pub batch_size: i32,
    pub cursor_type: CursorType,
    pub max_await_time_ms: Option<i64>,
}

impl CursorOptions {
    pub fn new() -> CursorOptions {
        Default::default()
    }
}

impl Default for CursorOptions {
    fn default() -> CursorOptions {
        CursorOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            cursor_type: CursorType::NonTailable,
            max_await_time_ms: None,
        }
    }
}

// Position record shared by a cursor and every handle derived from it, so
// that all of them observe one logical position.
#[derive(Debug)]
struct CursorShared {
    cursor_id: i64,
    batch: Vec<bson::Document>,
    pos: usize,
    generation: u64,
    state: CursorState,
    cursor_type: CursorType,
}

impl CursorShared {
    fn at_end(&self) -> bool {
        self.pos >= self.batch.len()
    }
}

/// Maintains a server-side cursor and lazily returns documents from a
/// query, one buffered batch at a time.
///
/// Fetches happen only inside `begin`: comparing or advancing handles
/// never touches the network. A fetch that fails leaves the cursor `Dead`
/// so it is not retried.
pub struct Cursor<S: BatchSource> {
    source: S,
    batch_size: i32,
    max_await_time_ms: Option<i64>,
    shared: Rc<RefCell<CursorShared>>,
}

impl<S: BatchSource> Cursor<S> {
    /// Wraps the first reply of a query in a cursor.
    ///
    /// Fails with `ArgumentError` if the options carry a negative batch
    /// size or await time; this is checked before any fetch is attempted.
    pub fn new(source: S, first_batch: Batch, options: CursorOptions) -> Result<Cursor<S>> {
        if options.batch_size < 0 {
            return Err(ArgumentError(
                format!("Invalid cursor batch size: {}.", options.batch_size),
            ));
        }

        if let Some(ms) = options.max_await_time_ms {
            if ms < 0 {
                return Err(ArgumentError(
                    format!("Invalid cursor max await time: {}ms.", ms),
                ));
            }
        }

        let state = if first_batch.cursor_id == 0 && first_batch.documents.is_empty() {
            CursorState::Dead
        } else {
            CursorState::Active
        };

        Ok(Cursor {
            source: source,
            batch_size: options.batch_size,
            max_await_time_ms: options.max_await_time_ms,
            shared: Rc::new(RefCell::new(CursorShared {
                cursor_id: first_batch.cursor_id,
                batch: first_batch.documents,
                pos: 0,
                generation: 0,
                state: state,
                cursor_type: options.cursor_type,
            })),
        })
    }

    /// Returns a handle positioned at the first unread document.
    ///
    /// If the buffered batch is used up and the cursor is not dead, this
    /// blocks on a fetch for the next batch; for tailable cursors this is
    /// also the revival point after a run of empty fetches. When nothing
    /// is available the returned handle equals `end()`.
    pub fn begin(&mut self) -> Result<CursorIter> {
        let needs_fetch = {
            let shared = self.shared.borrow();
            shared.at_end() && shared.state != CursorState::Dead
        };

        if needs_fetch {
            self.fetch_batch()?;
        }

        let at_end = self.shared.borrow().at_end();
        if at_end {
            Ok(CursorIter { shared: None })
        } else {
            Ok(CursorIter { shared: Some(self.shared.clone()) })
        }
    }

    /// Returns the end sentinel. Never fetches.
    pub fn end(&self) -> CursorIter {
        CursorIter { shared: None }
    }

    pub fn state(&self) -> CursorState {
        self.shared.borrow().state
    }

    pub fn cursor_id(&self) -> i64 {
        self.shared.borrow().cursor_id
    }

    /// How many batches have been fetched after the initial reply.
    pub fn generation(&self) -> u64 {
        self.shared.borrow().generation
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let (cursor_id, cursor_type) = {
            let shared = self.shared.borrow();
            (shared.cursor_id, shared.cursor_type)
        };

        if cursor_id == 0 {
            self.shared.borrow_mut().state = CursorState::Dead;
            return Ok(());
        }

        // The server only honors an await time on tailable-await cursors.
        let max_await_time_ms = match cursor_type {
            CursorType::TailableAwait => self.max_await_time_ms,
            _ => None,
        };

        let reply = match self.source.get_more(cursor_id, self.batch_size, max_await_time_ms) {
            Ok(reply) => reply,
            Err(err) => {
                // Leave the cursor dead so a failed fetch is not retried.
                self.shared.borrow_mut().state = CursorState::Dead;
                return Err(err);
            }
        };

        let mut shared = self.shared.borrow_mut();
        shared.generation += 1;
        shared.cursor_id = reply.cursor_id;
        shared.batch = reply.documents;
        shared.pos = 0;

        shared.state = if !shared.batch.is_empty() {
            CursorState::Active
        } else if reply.cursor_id != 0 && cursor_type != CursorType::NonTailable {
            // A tailable cursor outlives its data; documents appended
            // upstream can revive it on a later fetch.
            CursorState::Exhausted
        } else {
            CursorState::Dead
        };

        Ok(())
    }
}

impl<S: BatchSource> Iterator for Cursor<S> {
    type Item = Result<bson::Document>;

    /// Attempts to read a document from the cursor, fetching a new batch
    /// when the buffered one is exhausted.
    fn next(&mut self) -> Option<Result<bson::Document>> {
        let mut iter = match self.begin() {
            Ok(iter) => iter,
            Err(err) => return Some(Err(err)),
        };

        if iter.at_end() {
            return None;
        }

        let doc = match iter.document() {
            Ok(doc) => doc,
            Err(err) => return Some(Err(err)),
        };

        match iter.advance() {
            Ok(()) => Some(Ok(doc)),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<S: BatchSource> Drop for Cursor<S> {
    fn drop(&mut self) {
        let cursor_id = self.shared.borrow().cursor_id;
        if cursor_id != 0 {
            self.source.kill(cursor_id);
        }
    }
}

/// A handle on a cursor's current position.
///
/// A handle observes the owning cursor's (generation, in-batch index)
/// pair rather than storing its own copy, which is what keeps every
/// handle over one cursor in lockstep. Handles from different cursors are
/// never equal while live; any handle past the last buffered document
/// equals the end sentinel.
#[derive(Clone, Debug)]
pub struct CursorIter {
    shared: Option<Rc<RefCell<CursorShared>>>,
}

impl CursorIter {
    /// Whether this handle is past the last document of the current batch.
    pub fn at_end(&self) -> bool {
        match self.shared {
            Some(ref shared) => shared.borrow().at_end(),
            None => true,
        }
    }

    // The observed (generation, index) pair; None past the end.
    fn position(&self) -> Option<(u64, usize)> {
        match self.shared {
            Some(ref shared) => {
                let shared = shared.borrow();
                if shared.at_end() {
                    None
                } else {
                    Some((shared.generation, shared.pos))
                }
            }
            None => None,
        }
    }

    /// Returns the document under the handle.
    ///
    /// Fails with `ArgumentError` when the handle equals the end sentinel.
    pub fn document(&self) -> Result<bson::Document> {
        let shared = match self.shared {
            Some(ref shared) => shared.borrow(),
            None => {
                return Err(ArgumentError(
                    String::from("Cannot dereference the end of a cursor."),
                ))
            }
        };

        match shared.batch.get(shared.pos) {
            Some(doc) => Ok(doc.clone()),
            None => Err(ArgumentError(
                String::from("Cannot dereference an exhausted cursor handle."),
            )),
        }
    }

    /// Steps to the next buffered document.
    ///
    /// Never fetches: once the batch is used up, the handle compares equal
    /// to the end sentinel until the owning cursor's `begin` fetches again.
    pub fn advance(&mut self) -> Result<()> {
        let mut shared = match self.shared {
            Some(ref shared) => shared.borrow_mut(),
            None => {
                return Err(ArgumentError(
                    String::from("Cannot advance the end of a cursor."),
                ))
            }
        };

        if shared.at_end() {
            return Err(ArgumentError(
                String::from("Cannot advance an exhausted cursor handle."),
            ));
        }

        shared.pos += 1;
        Ok(())
    }
}

impl PartialEq for CursorIter {
    fn eq(&self, other: &CursorIter) -> bool {
        match (self.position(), other.position()) {
            (Some(lhs), Some(rhs)) => {
                if lhs != rhs {
                    return false;
                }
                match (&self.shared, &other.shared) {
                    (&Some(ref a), &Some(ref b)) => Rc::ptr_eq(a, b),
                    // A live position implies shared state on both sides.
                    _ => false,
                }
            }
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for CursorIter {}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{self, Bson};
    use error::{Error, ErrorCode};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use Result;

    #[derive(Default)]
    struct Script {
        replies: VecDeque<Result<Batch>>,
        fetches: Vec<(i64, i32, Option<i64>)>,
        killed: Vec<i64>,
    }

    // A batch source that replays canned replies and records every call.
    // When the script runs dry it behaves like an idle tailable cursor,
    // returning empty batches with the id unchanged.
    struct ScriptedSource {
        script: Rc<RefCell<Script>>,
    }

    impl BatchSource for ScriptedSource {
        fn get_more(
            &mut self,
            cursor_id: i64,
            batch_size: i32,
            max_await_time_ms: Option<i64>,
        ) -> Result<Batch> {
            let mut script = self.script.borrow_mut();
            script.fetches.push((cursor_id, batch_size, max_await_time_ms));
            match script.replies.pop_front() {
                Some(reply) => reply,
                None => Ok(Batch { cursor_id: cursor_id, documents: vec![] }),
            }
        }

        fn kill(&mut self, cursor_id: i64) {
            self.script.borrow_mut().killed.push(cursor_id);
        }
    }

    fn scripted(replies: Vec<Result<Batch>>) -> (ScriptedSource, Rc<RefCell<Script>>) {
        let script = Rc::new(RefCell::new(Script {
            replies: replies.into_iter().collect(),
            fetches: vec![],
            killed: vec![],
        }));
        (ScriptedSource { script: script.clone() }, script)
    }

    fn docs(range: ::std::ops::Range<i32>) -> Vec<bson::Document> {
        range.map(|x| doc! { "x": x }).collect()
    }

    fn x_of(doc: &bson::Document) -> i32 {
        match doc.get("x") {
            Some(&Bson::I32(x)) => x,
            other => panic!("missing x field: {:?}", other),
        }
    }

    #[test]
    fn iterates_across_batches() {
        let (source, script) = scripted(vec![
            Ok(Batch { cursor_id: 0, documents: docs(3..5) }),
        ]);

        let first = Batch { cursor_id: 91, documents: docs(1..3) };
        let cursor = Cursor::new(source, first, CursorOptions::new()).unwrap();

        let read: Vec<i32> = cursor.map(|doc| x_of(&doc.unwrap())).collect();
        assert_eq!(read, vec![1, 2, 3, 4]);
        assert_eq!(script.borrow().fetches.len(), 1);
    }

    #[test]
    fn begin_handles_compare_equal() {
        let (source, _script) = scripted(vec![]);
        let first = Batch { cursor_id: 0, documents: docs(1..3) };
        let mut cursor = Cursor::new(source, first, CursorOptions::new()).unwrap();

        let a = cursor.begin().unwrap();
        let b = cursor.begin().unwrap();
        assert_eq!(a, b);
        assert_eq!(x_of(&a.document().unwrap()), x_of(&b.document().unwrap()));
    }

    #[test]
    fn handles_stay_in_lockstep() {
        let (source, _script) = scripted(vec![
            Ok(Batch { cursor_id: 0, documents: docs(3..4) }),
        ]);

        let first = Batch { cursor_id: 42, documents: docs(1..3) };
        let mut cursor = Cursor::new(source, first, CursorOptions::new()).unwrap();

        let mut iter = cursor.begin().unwrap();
        let mut expected = 1;

        loop {
            let current = cursor.begin().unwrap();
            if current.at_end() {
                break;
            }

            // The handle matches both the current front of the cursor and
            // the document under it, and must not match the end sentinel.
            assert_eq!(iter, current);
            assert!(iter != cursor.end());
            assert_eq!(x_of(&iter.document().unwrap()), expected);

            iter.advance().unwrap();
            expected += 1;
        }

        assert_eq!(expected, 4);
        assert_eq!(iter, cursor.end());
        assert_eq!(cursor.end(), iter);
    }

    #[test]
    fn exhaustion_is_terminal_for_non_tailable_cursors() {
        let (source, script) = scripted(vec![]);
        let first = Batch { cursor_id: 0, documents: docs(1..2) };
        let mut cursor = Cursor::new(source, first, CursorOptions::new()).unwrap();

        assert_eq!(cursor.next().map(|doc| x_of(&doc.unwrap())), Some(1));
        assert!(cursor.next().is_none());
        assert_eq!(cursor.state(), CursorState::Dead);

        // However many times the ends are compared, nothing is fetched.
        for _ in 0..3 {
            let begin = cursor.begin().unwrap();
            assert_eq!(begin, cursor.end());
        }
        assert_eq!(script.borrow().fetches.len(), 0);
    }

    #[test]
    fn empty_fetch_kills_non_tailable_cursor() {
        let (source, script) = scripted(vec![
            Ok(Batch { cursor_id: 77, documents: vec![] }),
        ]);

        let first = Batch { cursor_id: 77, documents: docs(1..2) };
        {
            let mut cursor = Cursor::new(source, first, CursorOptions::new()).unwrap();
            assert!(cursor.next().unwrap().is_ok());
            assert!(cursor.next().is_none());
            assert_eq!(cursor.state(), CursorState::Dead);
        }

        // The id was still live when the cursor was dropped.
        assert_eq!(script.borrow().killed, vec![77]);
    }

    #[test]
    fn tailable_cursor_revives_on_begin() {
        let (source, script) = scripted(vec![
            Ok(Batch { cursor_id: 55, documents: vec![] }),
        ]);

        let options = CursorOptions {
            cursor_type: CursorType::Tailable,
            ..CursorOptions::new()
        };
        let first = Batch { cursor_id: 55, documents: docs(1..4) };
        let mut cursor = Cursor::new(source, first, options).unwrap();

        let mut iter = cursor.begin().unwrap();
        let mut expected = 1;
        while !cursor.begin().unwrap().at_end() {
            assert_eq!(x_of(&iter.document().unwrap()), expected);
            iter.advance().unwrap();
            expected += 1;
        }
        assert_eq!(expected, 4);
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert_eq!(iter, cursor.end());

        // New documents arrive upstream. Until the next begin(), the
        // existing handle still appears exhausted.
        script.borrow_mut().replies.push_back(
            Ok(Batch { cursor_id: 55, documents: docs(4..7) }),
        );
        assert_eq!(iter, cursor.end());

        // The fetch inside begin() revives the cursor, and with it every
        // outstanding handle.
        cursor.begin().unwrap();
        assert!(iter != cursor.end());
        assert_eq!(iter, cursor.begin().unwrap());
        assert_eq!(cursor.state(), CursorState::Active);

        while !cursor.begin().unwrap().at_end() {
            assert_eq!(x_of(&iter.document().unwrap()), expected);
            iter.advance().unwrap();
            expected += 1;
        }
        assert_eq!(expected, 7);
        assert_eq!(iter, cursor.end());
        assert_eq!(cursor.begin().unwrap(), cursor.end());
    }

    #[test]
    fn tailable_cursor_stays_exhausted_on_empty_fetches() {
        let (source, script) = scripted(vec![
            Ok(Batch { cursor_id: 55, documents: vec![] }),
            Ok(Batch { cursor_id: 55, documents: vec![] }),
        ]);

        let options = CursorOptions {
            cursor_type: CursorType::Tailable,
            ..CursorOptions::new()
        };
        let first = Batch { cursor_id: 55, documents: vec![] };
        let mut cursor = Cursor::new(source, first, options).unwrap();

        assert_eq!(cursor.begin().unwrap(), cursor.end());
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert_eq!(cursor.begin().unwrap(), cursor.end());
        assert_eq!(cursor.state(), CursorState::Exhausted);
        assert_eq!(script.borrow().fetches.len(), 2);
    }

    #[test]
    fn await_time_is_passed_for_tailable_await_only() {
        let (source, script) = scripted(vec![
            Ok(Batch { cursor_id: 9, documents: vec![] }),
        ]);
        let options = CursorOptions {
            cursor_type: CursorType::TailableAwait,
            max_await_time_ms: Some(250),
            ..CursorOptions::new()
        };
        let first = Batch { cursor_id: 9, documents: vec![] };
        let mut cursor = Cursor::new(source, first, options).unwrap();
        cursor.begin().unwrap();
        assert_eq!(script.borrow().fetches[0], (9, DEFAULT_BATCH_SIZE, Some(250)));

        let (source, script) = scripted(vec![
            Ok(Batch { cursor_id: 9, documents: vec![] }),
        ]);
        let options = CursorOptions {
            cursor_type: CursorType::Tailable,
            max_await_time_ms: Some(250),
            ..CursorOptions::new()
        };
        let first = Batch { cursor_id: 9, documents: vec![] };
        let mut cursor = Cursor::new(source, first, options).unwrap();
        cursor.begin().unwrap();
        assert_eq!(script.borrow().fetches[0], (9, DEFAULT_BATCH_SIZE, None));
    }

    #[test]
    fn negative_await_time_is_rejected_before_any_fetch() {
        let (source, script) = scripted(vec![]);
        let options = CursorOptions {
            cursor_type: CursorType::TailableAwait,
            max_await_time_ms: Some(-1),
            ..CursorOptions::new()
        };
        let first = Batch { cursor_id: 3, documents: vec![] };

        match Cursor::new(source, first, options) {
            Err(Error::ArgumentError(_)) => (),
            other => panic!("expected ArgumentError, got {:?}", other.map(|_| ())),
        }
        assert_eq!(script.borrow().fetches.len(), 0);
    }

    #[test]
    fn negative_batch_size_is_rejected_before_any_fetch() {
        let (source, script) = scripted(vec![]);
        let options = CursorOptions { batch_size: -1, ..CursorOptions::new() };
        let first = Batch { cursor_id: 3, documents: vec![] };

        match Cursor::new(source, first, options) {
            Err(Error::ArgumentError(_)) => (),
            other => panic!("expected ArgumentError, got {:?}", other.map(|_| ())),
        }
        assert_eq!(script.borrow().fetches.len(), 0);
    }

    #[test]
    fn fetch_failure_kills_the_cursor() {
        let (source, script) = scripted(vec![Err(Error::CursorNotFoundError)]);

        let first = Batch { cursor_id: 13, documents: docs(1..2) };
        let mut cursor = Cursor::new(source, first, CursorOptions::new()).unwrap();
        assert!(cursor.next().unwrap().is_ok());

        let err = cursor.begin().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CursorNotFound as i32));
        match err {
            Error::CursorNotFoundError => (),
            other => panic!("expected CursorNotFoundError, got {:?}", other),
        }
        assert_eq!(cursor.state(), CursorState::Dead);

        // The failure is not retried.
        assert_eq!(cursor.begin().unwrap(), cursor.end());
        assert_eq!(script.borrow().fetches.len(), 1);
    }

    #[test]
    fn end_handle_cannot_be_dereferenced_or_advanced() {
        let (source, _script) = scripted(vec![]);
        let first = Batch { cursor_id: 0, documents: vec![] };
        let cursor = Cursor::new(source, first, CursorOptions::new()).unwrap();

        let mut end = cursor.end();
        match end.document() {
            Err(Error::ArgumentError(_)) => (),
            other => panic!("expected ArgumentError, got {:?}", other),
        }
        match end.advance() {
            Err(Error::ArgumentError(_)) => (),
            other => panic!("expected ArgumentError, got {:?}", other),
        }
    }
}
