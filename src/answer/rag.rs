use std::fmt::Write;

use tracing::info;

use super::{Answer, Composer};
use crate::{error::ComposeError, retrieval::NO_RELEVANT_INFORMATION};

impl Composer {
    pub(super) async fn retrieval(&self, query: &str) -> Result<Answer, ComposeError> {
        let Some(context) = self.retrieval.assemble(query, self.top_k).await? else {
            return Ok(Answer::Text(NO_RELEVANT_INFORMATION.to_string()));
        };
        info!(
            "Answering from {} chunks ({} sources)",
            context.chunks.len(),
            context.sources.len()
        );

        let reply = self
            .completion
            .complete(&grounded_prompt(&context.render(), query))
            .await?;
        let text = reply.trim();
        if text == NO_RELEVANT_INFORMATION {
            return Ok(Answer::Text(text.to_string()));
        }
        Ok(Answer::Grounded {
            text: text.to_string(),
            sources: context.sources,
        })
    }
}

fn grounded_prompt(context: &str, question: &str) -> String {
    let mut prompt = String::from(
        "You are an enterprise knowledge assistant.\n\n\
         Answer the question using ONLY the retrieved enterprise content below.\n\
         - Do NOT use outside knowledge or make assumptions.\n\
         - Do not mention internal tools, embeddings, or databases.\n\
         - Write a concise, well structured summary for a business user.\n\n",
    );
    let _ = writeln!(
        prompt,
        "If the content does not contain the answer, respond with:\n\"{NO_RELEVANT_INFORMATION}\"\n"
    );
    let _ = write!(
        prompt,
        "Retrieved Content:\n{context}\n\nQuestion:\n{question}\nAnswer:"
    );
    prompt
}
