//! Flat recipe entity produced by the fetcher and consumed by ingestion.

use serde::{Deserialize, Serialize};

/// A recipe flattened from the Mealie detail payload.
///
/// Built once by the fetcher and never mutated afterwards. The text submitted to
/// the embedding model is derived from these fields by [`Recipe::embedding_text`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Mealie identifier (a UUID on real instances).
    pub id: String,
    /// URL slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Category names, in Mealie order.
    #[serde(default)]
    pub category: Vec<String>,
    /// Tag names, in Mealie order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// User rating between 0 and 5.
    #[serde(default)]
    pub rating: Option<f32>,
    /// One line per ingredient.
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// One line per instruction step.
    #[serde(default)]
    pub instructions: Vec<String>,
}

impl Recipe {
    /// Flattened text used for embedding and, verbatim, as the recipe body in
    /// the LLM context block.
    ///
    /// The field order is fixed: title, description, rating, category, tags,
    /// ingredients, instructions. Absent or empty values drop their line; the
    /// output always ends with a newline.
    pub fn embedding_text(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, "Title", self.name.trim());
        if let Some(description) = self.description.as_deref() {
            push_line(&mut out, "Description", description.trim());
        }
        if let Some(rating) = self.rating {
            push_line(&mut out, "Rating", &format_rating(rating));
        }
        push_line(&mut out, "Category", &self.category.join(", "));
        push_line(&mut out, "Tags", &self.tags.join(", "));
        push_list(&mut out, "Ingredients", &self.ingredients);
        push_list(&mut out, "Instructions", &self.instructions);
        out
    }
}

/// Renders a rating with one decimal (`5` becomes `5.0`).
pub fn format_rating(rating: f32) -> String {
    format!("{rating:.1}")
}

fn push_line(out: &mut String, label: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    out.push_str(label);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

fn push_list(out: &mut String, label: &str, items: &[String]) {
    let mut items = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .peekable();
    if items.peek().is_none() {
        return;
    }
    out.push_str(label);
    out.push_str(":\n");
    for item in items {
        out.push_str("- ");
        out.push_str(item);
        out.push('\n');
    }
}

#[cfg(test)]
pub(crate) fn parfait() -> Recipe {
    Recipe {
        id: "487a6099-f164-4f70-8f61-e73b82935333".into(),
        slug: "greek-yogurt-parfait".into(),
        name: "Greek Yogurt Parfait".into(),
        description: Some("High-protein breakfast with probiotics and fiber.".into()),
        category: vec!["Breakfast".into(), "Healthy".into()],
        tags: vec!["vegetarian".into(), "high-protein".into(), "quick".into()],
        rating: Some(5.0),
        ingredients: vec![
            "1 cup Greek yogurt".into(),
            "1/2 cup granola".into(),
            "1/2 cup mixed berries".into(),
            "1 tbsp honey".into(),
            "1 tsp flax seeds".into(),
        ],
        instructions: vec![
            "Layer yogurt in a bowl or glass.".into(),
            "Add a layer of granola.".into(),
            "Top with fresh berries.".into(),
            "Drizzle with honey and sprinkle flax seeds.".into(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn embedding_text_follows_fixed_field_order() {
        let expected = "\
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
";
        assert_eq!(parfait().embedding_text(), expected);
    }

    #[test]
    fn embedding_text_skips_missing_fields() {
        let recipe = Recipe {
            id: "1".into(),
            slug: "toast".into(),
            name: "Toast".into(),
            description: None,
            category: Vec::new(),
            tags: Vec::new(),
            rating: None,
            ingredients: vec!["bread".into(), "  ".into()],
            instructions: Vec::new(),
        };
        assert_eq!(recipe.embedding_text(), "Title: Toast\nIngredients:\n- bread\n");
    }

    #[test]
    fn embedding_text_is_deterministic() {
        let recipe = parfait();
        assert_eq!(recipe.embedding_text(), recipe.clone().embedding_text());
    }
}
