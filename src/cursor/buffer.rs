use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use mongodb::bson::Document;

/// Per-document mapping applied when documents leave the buffer.
pub type Transform = Arc<dyn Fn(Document) -> Document + Send + Sync>;

/// Compose `next` after `first`: the result maps `d` to `next(first(d))`.
pub(crate) fn compose(first: Option<Transform>, next: Transform) -> Transform {
    match first {
        None => next,
        Some(first) => Arc::new(move |document| next(first(document))),
    }
}

/// Documents fetched from the server but not yet handed to the caller.
///
/// Front is the next document to yield. Documents are stored raw; the
/// transform runs when a document leaves, lazily for single pulls and
/// eagerly for bulk drains.
#[derive(Default)]
pub struct BatchBuffer {
    documents: VecDeque<Document>,
    transform: Option<Transform>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Replace the contents with a freshly fetched batch.
    pub fn replace(&mut self, batch: Vec<Document>) {
        self.documents = VecDeque::from(batch);
    }

    /// Remove the front document without transforming it.
    pub fn pop_front_raw(&mut self) -> Option<Document> {
        self.documents.pop_front()
    }

    /// Put a raw document back at the front.
    pub fn push_front_raw(&mut self, document: Document) {
        self.documents.push_front(document);
    }

    /// Remove the front document and transform it.
    pub fn pop_front(&mut self) -> Option<Document> {
        self.documents.pop_front().map(|document| self.apply(document))
    }

    /// Move up to `limit` documents (all when `None`) into `out`, transformed.
    pub fn drain_into(&mut self, out: &mut Vec<Document>, limit: Option<usize>) {
        let count = limit.map_or(self.documents.len(), |n| n.min(self.documents.len()));
        out.reserve(count);
        for document in self.documents.drain(..count) {
            let document = match &self.transform {
                Some(transform) => transform(document),
                None => document,
            };
            out.push(document);
        }
    }

    /// Discard every buffered document.
    pub fn clear(&mut self) {
        self.documents.clear();
    }

    /// Apply the current transform to a document that did not come from the buffer.
    pub fn apply(&self, document: Document) -> Document {
        match &self.transform {
            Some(transform) => transform(document),
            None => document,
        }
    }

    /// Compose `transform` after any transform already set.
    pub fn compose_transform(&mut self, transform: Transform) {
        self.transform = Some(compose(self.transform.take(), transform));
    }
}

impl fmt::Debug for BatchBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchBuffer")
            .field("len", &self.documents.len())
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn tag(label: &'static str) -> Transform {
        Arc::new(move |mut document: Document| {
            let mut trail = document.get_str("trail").unwrap_or_default().to_string();
            trail.push_str(label);
            document.insert("trail", trail);
            document
        })
    }

    #[test]
    fn test_pop_front_preserves_order() {
        let mut buffer = BatchBuffer::new();
        buffer.replace(vec![doc! { "n": 1 }, doc! { "n": 2 }]);
        assert_eq!(buffer.pop_front(), Some(doc! { "n": 1 }));
        assert_eq!(buffer.pop_front(), Some(doc! { "n": 2 }));
        assert_eq!(buffer.pop_front(), None);
    }

    #[test]
    fn test_composition_order_single_and_bulk() {
        let mut buffer = BatchBuffer::new();
        buffer.compose_transform(tag("f"));
        buffer.compose_transform(tag("g"));
        buffer.replace(vec![doc! { "n": 1 }, doc! { "n": 2 }, doc! { "n": 3 }]);

        let single = buffer.pop_front().unwrap();
        assert_eq!(single.get_str("trail").unwrap(), "fg");

        let mut rest = Vec::new();
        buffer.drain_into(&mut rest, None);
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|d| d.get_str("trail").unwrap() == "fg"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_with_limit() {
        let mut buffer = BatchBuffer::new();
        buffer.replace(vec![doc! { "n": 1 }, doc! { "n": 2 }, doc! { "n": 3 }]);
        let mut out = Vec::new();
        buffer.drain_into(&mut out, Some(2));
        assert_eq!(out, vec![doc! { "n": 1 }, doc! { "n": 2 }]);
        assert_eq!(buffer.len(), 1);

        buffer.drain_into(&mut out, Some(10));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_push_front_raw_is_transformed_once() {
        let mut buffer = BatchBuffer::new();
        buffer.compose_transform(tag("f"));
        buffer.replace(vec![doc! { "n": 1 }]);

        let raw = buffer.pop_front_raw().unwrap();
        buffer.push_front_raw(raw);
        let out = buffer.pop_front().unwrap();
        assert_eq!(out.get_str("trail").unwrap(), "f");
    }
}
