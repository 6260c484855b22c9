//! Context assembly and prompt construction for retrieved recipes.

use crate::llm::ChatMessage;
use crate::recipe::format_rating;
use crate::vector_store::SearchHit;

/// Opening marker of one recipe in the context block.
pub const RECIPE_START: &str = "[RECIPE_START]";
/// Closing marker of one recipe in the context block.
pub const RECIPE_END: &str = "[RECIPE_END]";

/// Sentence the model must use before answering from general knowledge.
pub const GENERAL_KNOWLEDGE_DISCLAIMER: &str =
    "Here's a suggestion based on my general cooking knowledge:";

const LINK_PATTERN_SLOT: &str = "{link_pattern}";
const EXAMPLE_LINK_SLOT: &str = "{example_link}";
const EXAMPLE_RECIPE_ID: &str = "487a6099-f164-4f70-8f61-e73b82935333";

const SYSTEM_PROMPT: &str = r#"
You are MealieChef, an expert personal chef assistant.

## ROLE
You are a helpful, accurate, and friendly culinary assistant. You rely STRICTLY on the provided [CONTEXT] (recipes) to answer questions.

### RULES OF ENGAGEMENT
1. Analyze the provided [CONTEXT].
2. Answer the user's Request, [USER REQUEST], based on the provided [CONTEXT] recipes.
3. Mention which recipes you considered relevant and why.
4. If provided in the [CONTEXT], always mention the rating (1-5) of each recipe you suggest in your answer.
5. If the answer is not in the [CONTEXT], say: "I don't have enough information in your recipes to answer that."
6. Link format: [Recipe Name]({link_pattern})
7. Do NOT mention UUIDs/IDs in the text, only inside the link markdown.
8. Keep answers concise and relevant.
9. If relevant to the [USER REQUEST], you MAY suggest adaptations/variation/substitutions, but you MUST state: "Here's a suggestion based on my general cooking knowledge:"
10. Use plain english, do not mention internal keywords like [CONTEXT], [USER REQUEST], [RECIPE_START] or [RECIPE_END].

### CONTEXT RECIPE EXAMPLE
[RECIPE_START]
RecipeName: Greek Yogurt Parfait
RecipeID: 487a6099-f164-4f70-8f61-e73b82935333
Title: Greek Yogurt Parfait
Description: High-protein breakfast with probiotics and fiber.
Rating: 5.0
Category: Breakfast, Healthy
Tags: vegetarian, high-protein, quick
Ingredients:
- 1 cup Greek yogurt
- 1/2 cup granola
- 1/2 cup mixed berries
- 1 tbsp honey
- 1 tsp flax seeds
Instructions:
- Layer yogurt in a bowl or glass.
- Add a layer of granola.
- Top with fresh berries.
- Drizzle with honey and sprinkle flax seeds.
[RECIPE_END]

#### Recipe fields meaning:
- rating: number between 1 and 5, 5 is better, 1 is worse
- category: comma separated list of categories
- tags: comma separated list of tags

### RECIPE LINK EXAMPLE

[Greek Yogurt Parfait]({example_link})
"#;

/// System prompt with the recipe-link base URL filled in.
pub fn system_prompt(external_url: &str) -> String {
    SYSTEM_PROMPT
        .replace(LINK_PATTERN_SLOT, &recipe_link(external_url, "RecipeID"))
        .replace(EXAMPLE_LINK_SLOT, &recipe_link(external_url, EXAMPLE_RECIPE_ID))
}

/// Link shown to users for a recipe: `{external_url}/g/home/r/{recipe_id}`.
pub fn recipe_link(external_url: &str, recipe_id: &str) -> String {
    format!("{}/g/home/r/{recipe_id}", external_url.trim_end_matches('/'))
}

/// One delimited block per hit, in hit order.
pub fn build_context(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for hit in hits {
        let payload = &hit.payload;
        out.push_str(RECIPE_START);
        out.push('\n');
        out.push_str(&format!("RecipeName: {}\n", payload.name));
        out.push_str(&format!("RecipeID: {}\n", payload.recipe_id));
        out.push_str(&payload.embedding_text);
        if !payload.embedding_text.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(RECIPE_END);
        out.push('\n');
    }
    out
}

/// User message: the context block followed by the raw query.
pub fn user_message(query: &str, hits: &[SearchHit]) -> String {
    format!(
        "\n[CONTEXT]:\n{}\n[USER REQUEST]:\n{query}",
        build_context(hits)
    )
}

/// The complete single-turn request: exactly one system and one user message.
pub fn build_messages(query: &str, hits: &[SearchHit], external_url: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(external_url)),
        ChatMessage::user(user_message(query, hits)),
    ]
}

/// Markdown table of the recipes used for an answer.
pub fn sources_table(hits: &[SearchHit]) -> String {
    let mut out = String::from("| Name | Rating | Tags | Category |\n|---|---|---|---|\n");
    for hit in hits {
        let payload = &hit.payload;
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            payload.name,
            rating_label(payload.rating),
            payload.tags.join(", "),
            payload.category.join(", ")
        ));
    }
    out
}

/// One line per hit, for the terminal front end.
pub fn sources_lines(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            let payload = &hit.payload;
            format!(
                "**Name:** {} **Rating:** {} **Tags:** {} **Category:** {}\n",
                payload.name,
                rating_label(payload.rating),
                payload.tags.join(", "),
                payload.category.join(", ")
            )
        })
        .collect()
}

fn rating_label(rating: Option<f32>) -> String {
    rating.map(format_rating).unwrap_or_else(|| "N/A".to_string())
}
