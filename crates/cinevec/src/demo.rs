//! Built-in movie corpus for `search --in-memory`.
//!
//! Plots are embedded through the configured provider at startup and loaded
//! into an in-memory store, so the search path can be tried without a
//! MongoDB cluster.

use cinevec_store::{Document, EmbeddingVector};

pub struct DemoMovie {
    pub title: &'static str,
    pub year: i64,
    pub plot: &'static str,
}

pub const MOVIES: &[DemoMovie] = &[
    DemoMovie {
        title: "Back to the Future",
        year: 1985,
        plot: "A teenager is accidentally sent thirty years into the past in a time-traveling car and must make sure his parents fall in love.",
    },
    DemoMovie {
        title: "The Terminator",
        year: 1984,
        plot: "A cyborg assassin is sent back in time to kill the mother of a future resistance leader.",
    },
    DemoMovie {
        title: "Time Bandits",
        year: 1981,
        plot: "A boy joins a band of dwarves who steal a map of holes in time and travel through history looting treasure.",
    },
    DemoMovie {
        title: "Bill & Ted's Excellent Adventure",
        year: 1989,
        plot: "Two slackers travel through time in a phone booth collecting historical figures for their history report.",
    },
    DemoMovie {
        title: "Peggy Sue Got Married",
        year: 1986,
        plot: "A woman faints at her high school reunion and wakes up back in her senior year, able to change her past.",
    },
    DemoMovie {
        title: "Groundhog Day",
        year: 1993,
        plot: "A weatherman finds himself living the same day over and over again in a small town.",
    },
    DemoMovie {
        title: "Twelve Monkeys",
        year: 1995,
        plot: "A convict is sent back in time to gather information about a virus that wiped out most of humanity.",
    },
    DemoMovie {
        title: "Looper",
        year: 2012,
        plot: "A hitman who kills targets sent from the future faces his own older self sent back through time.",
    },
    DemoMovie {
        title: "Somewhere in Time",
        year: 1980,
        plot: "A playwright uses self-hypnosis to travel back to 1912 to meet the actress whose portrait captivated him.",
    },
    DemoMovie {
        title: "Aliens",
        year: 1986,
        plot: "A survivor returns to a colony planet with marines to fight a nest of hostile alien creatures.",
    },
    DemoMovie {
        title: "The Breakfast Club",
        year: 1985,
        plot: "Five high school students from different cliques spend a Saturday detention together.",
    },
    DemoMovie {
        title: "Jaws",
        year: 1975,
        plot: "A police chief, a marine biologist and a fisherman hunt a great white shark terrorizing a beach town.",
    },
];

/// Documents for the demo corpus, with the plot embeddings stored at `field`.
pub fn documents(field: &str, embeddings: Vec<EmbeddingVector>) -> Vec<Document> {
    MOVIES
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(i, (movie, embedding))| {
            Document::new(format!("demo-{:02}", i))
                .with_field("title", movie.title)
                .with_field("year", movie.year)
                .with_field("plot", movie.plot)
                .with_field(field, embedding)
        })
        .collect()
}

pub fn plots() -> impl Iterator<Item = &'static str> {
    MOVIES.iter().map(|m| m.plot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_carry_fields() {
        let embeddings = MOVIES
            .iter()
            .map(|_| EmbeddingVector::new(vec![0.0; 4]))
            .collect();
        let docs = documents("emb", embeddings);

        assert_eq!(docs.len(), MOVIES.len());
        assert_eq!(docs[0].get_str("title"), Some("Back to the Future"));
        assert_eq!(docs[0].get_i64("year"), Some(1985));
        assert_eq!(docs[0].vector("emb").unwrap().dimensions(), 4);
        assert_eq!(plots().count(), MOVIES.len());
    }
}
