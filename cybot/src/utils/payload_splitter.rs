/// Iterator over successive pieces of a message body, each at most a given
/// number of **bytes** long.
///
/// Pieces never end inside a UTF-8 character, and concatenating them gives
/// back the input text. An empty body yields a single empty piece, so that
/// sending it still produces one frame.
pub struct PayloadSplitter<'a> {
    rest: Option<&'a str>,
    max_len: usize,
}

impl<'a> PayloadSplitter<'a> {
    pub fn new(text: &'a str, max_len: usize) -> Self {
        Self {
            rest: Some(text),
            max_len,
        }
    }
}

impl<'a> Iterator for PayloadSplitter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest?;

        if rest.len() <= self.max_len {
            self.rest = None;
            return Some(rest);
        }

        let mut end = self.max_len;
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // A limit smaller than one character; emit that character alone
            end = rest
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
        }

        let (piece, remaining) = rest.split_at(end);
        self.rest = if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        };
        Some(piece)
    }
}

/// Split `text` into pieces of at most `max_len` bytes
pub fn split_payload(text: &str, max_len: usize) -> PayloadSplitter<'_> {
    PayloadSplitter::new(text, max_len)
}
