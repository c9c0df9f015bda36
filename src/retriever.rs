use crate::cluster;
use crate::config::Settings;
use crate::error::{RecallError, StorageError};
use crate::ingest;
use crate::llm::{CompletionProvider, construct_prompt};
use crate::search::{self, SearchHit};
use crate::store::{ChatRecord, ChatStore};
use crate::utils::now_timestamp;
use std::collections::BTreeMap;
use std::path::Path;

/// Entry point for every user action: owns the store handle and the
/// settings that shape search and clustering.
pub struct Retriever {
    store: ChatStore,
    settings: Settings,
}

impl Retriever {
    /// Opens the configured database and makes sure the table exists.
    pub fn open(settings: Settings) -> Result<Self, StorageError> {
        let store = ChatStore::open(&settings.database.path)?;
        Self::with_store(store, settings)
    }

    pub fn with_store(store: ChatStore, settings: Settings) -> Result<Self, StorageError> {
        store.initialize()?;
        Ok(Retriever { store, settings })
    }

    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, StorageError> {
        let corpus = self.store.scan_all()?;
        Ok(search::search(query, &corpus, &self.settings.search))
    }

    /// Topic groups over every stored input, duplicates included.
    pub fn cluster_by_topic(&self) -> Result<BTreeMap<usize, Vec<String>>, StorageError> {
        let inputs: Vec<String> = self
            .store
            .scan_all()?
            .into_iter()
            .map(|record| record.user_input)
            .collect();
        Ok(cluster::cluster_by_topic(&inputs, &self.settings.clustering))
    }

    pub fn ingest_file(&mut self, path: impl AsRef<Path>) -> Result<usize, RecallError> {
        ingest::ingest_file(&mut self.store, path)
    }

    /// Asks the provider and stores the exchange only once an answer came
    /// back. With `with_history`, similar past exchanges are sent as context
    /// while the raw prompt is what gets stored.
    pub async fn ask<P: CompletionProvider>(
        &mut self,
        provider: &P,
        prompt: &str,
        with_history: bool,
    ) -> Result<(i64, String), RecallError> {
        let full_prompt = if with_history {
            construct_prompt(prompt, &self.search(prompt)?)
        } else {
            prompt.to_string()
        };

        let response = provider.complete(&full_prompt).await?;
        let id = self.store.append(&now_timestamp(), prompt, &response)?;
        Ok((id, response))
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        self.store.count()
    }

    pub fn history(&self) -> Result<Vec<ChatRecord>, StorageError> {
        self.store.scan_all()
    }

    pub fn close(self) -> Result<(), StorageError> {
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use anyhow::Result;
    use std::cell::RefCell;
    use tempfile::tempdir;

    struct FakeProvider {
        reply: Option<String>,
        prompts: RefCell<Vec<String>>,
    }

    impl FakeProvider {
        fn answering(reply: &str) -> Self {
            FakeProvider {
                reply: Some(reply.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            FakeProvider {
                reply: None,
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl CompletionProvider for FakeProvider {
        async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.reply.clone().ok_or(ApiError::EmptyResponse)
        }
    }

    fn retriever() -> Result<Retriever> {
        Ok(Retriever::with_store(
            ChatStore::open_in_memory()?,
            Settings::default(),
        )?)
    }

    #[tokio::test]
    async fn test_ask_stores_successful_exchange() -> Result<()> {
        let mut retriever = retriever()?;
        let provider = FakeProvider::answering("r1");

        let (id, response) = retriever.ask(&provider, "hello world", false).await?;
        assert_eq!(response, "r1");

        let history = retriever.history()?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].user_input, "hello world");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_completion_writes_nothing() -> Result<()> {
        let mut retriever = retriever()?;
        let result = retriever.ask(&FakeProvider::failing(), "question", false).await;

        assert!(matches!(result, Err(RecallError::Api(_))));
        assert!(retriever.history()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_ask_with_history_sends_context_stores_raw_prompt() -> Result<()> {
        let mut retriever = retriever()?;
        retriever
            .ask(&FakeProvider::answering("a language"), "what is rust", false)
            .await?;

        let provider = FakeProvider::answering("ownership");
        retriever.ask(&provider, "what is rust for", true).await?;

        let sent = provider.prompts.borrow();
        assert!(sent[0].contains("Q: what is rust\nA: a language"));
        assert_eq!(retriever.history()?[1].user_input, "what is rust for");
        Ok(())
    }

    #[tokio::test]
    async fn test_search_and_topics_example() -> Result<()> {
        let mut retriever = retriever()?;
        for (input, reply) in [("hello world", "r1"), ("hello there", "r2"), ("goodbye", "r3")] {
            retriever.ask(&FakeProvider::answering(reply), input, false).await?;
        }

        let hits = retriever.search("hello")?;
        let inputs: Vec<&str> = hits.iter().map(|h| h.user_input.as_str()).collect();
        assert_eq!(inputs, vec!["hello world", "hello there"]);

        let topics = retriever.cluster_by_topic()?;
        assert_eq!(topics.len(), 3);
        assert!(topics.values().all(|members| members.len() == 1));
        Ok(())
    }

    #[test]
    fn test_open_on_disk_and_import() -> Result<()> {
        let dir = tempdir()?;
        let import = dir.path().join("export.json");
        std::fs::write(
            &import,
            r#"{"conversations": [{"messages": [
                {"author": {"role": "user"}, "content": "first question"},
                {"author": {"role": "assistant"}, "content": "first answer"}
            ]}]}"#,
        )?;

        let mut settings = Settings::default();
        settings.database.path = dir.path().join("data").join("chat_history.db");

        let mut retriever = Retriever::open(settings.clone())?;
        assert_eq!(retriever.ingest_file(&import)?, 1);
        retriever.close()?;

        let retriever = Retriever::open(settings)?;
        assert_eq!(retriever.history()?.len(), 1);
        assert_eq!(retriever.count()?, 1);
        assert!(retriever.cluster_by_topic()?.is_empty());
        Ok(())
    }
}
