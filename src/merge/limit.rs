use super::MergedResult;
use crate::error::Result;
use crate::statement::Pagination;
use crate::value::Value;

/// Applies OFFSET/LIMIT over a merged stream and closes it early once the limit is reached.
pub struct LimitDecoratorMergedResult {
    inner: Box<dyn MergedResult>,
    offset: u64,
    limit: Option<u64>,
    skipped: bool,
    emitted: u64,
    finished: bool,
}

impl LimitDecoratorMergedResult {
    pub fn new(inner: Box<dyn MergedResult>, pagination: Pagination) -> Self {
        Self {
            inner,
            offset: pagination.offset,
            limit: pagination.limit,
            skipped: false,
            emitted: 0,
            finished: false,
        }
    }

    fn finish(&mut self) -> Result<bool> {
        self.finished = true;
        self.inner.close()?;
        Ok(false)
    }
}

impl MergedResult for LimitDecoratorMergedResult {
    fn next(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.offset {
                if !self.inner.next()? {
                    return self.finish();
                }
            }
        }
        if self.limit.is_some_and(|limit| self.emitted >= limit) {
            return self.finish();
        }
        if self.inner.next()? {
            self.emitted += 1;
            Ok(true)
        } else {
            self.finish()
        }
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        self.inner.value(index)
    }

    fn was_null(&self) -> bool {
        self.inner.was_null()
    }

    fn close(&mut self) -> Result<()> {
        self.finished = true;
        self.inner.close()
    }
}
