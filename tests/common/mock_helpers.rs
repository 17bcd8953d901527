//! Mock construction helpers

use super::builders::FrameBuilder;
use framepipe::{DataSource, Result};
use mockall::mock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

mock! {
    pub Source {}

    impl DataSource for Source {
        fn acquire(&mut self) -> Result<Option<framepipe::Frame>>;
        fn release(&mut self);
        fn describe(&self) -> String;
    }
}

/// Endless mock source counting every successful `acquire`
pub fn counting_source(acquired: Arc<AtomicU64>) -> MockSource {
    let mut source = MockSource::new();
    source.expect_acquire().returning(move || {
        acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Some(FrameBuilder::new(2, 2).build()))
    });
    source.expect_release().return_const(());
    source
        .expect_describe()
        .return_const("counting mock".to_string());
    source
}
