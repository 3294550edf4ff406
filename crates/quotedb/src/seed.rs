//! Sample catalog data.

use crate::entity::{Author, Quote, Subject};
use crate::repository::{upsert_author, upsert_subject};
use quotedb_core::{Connection, Cx, EntityRef, Error, Outcome, Result, try_outcome, try_result};
use quotedb_session::Session;

pub const WIM_HOF: &str = "Wim Hof";
pub const RON_PAUL: &str = "Ron Paul";
pub const DAVID_ICKE: &str = "David Icke";

pub const INNER_STRENGTH: &str = "inner strength";
pub const LIBERTY: &str = "liberty";
pub const POLITICS: &str = "politics";
pub const FINANCIAL_SYSTEM: &str = "financial system";
pub const DEFENSE: &str = "defense";
pub const PEACE: &str = "peace";

/// `(text, author, subjects)` of the seed quotes, in insertion order.
pub const SEED_QUOTES: &[(&str, &str, &[&str])] = &[
    (
        "If you can learn how to use your mind, anything is possible.",
        WIM_HOF,
        &[INNER_STRENGTH],
    ),
    (
        "I'm not afraid of dying. I'm afraid not to have lived.",
        WIM_HOF,
        &[INNER_STRENGTH],
    ),
    (
        "I've come to understand that if you want to learn something badly enough,\n\
         you'll find a way to make it happen.\n\
         Having the will to search and succeed is very important",
        WIM_HOF,
        &[INNER_STRENGTH],
    ),
    (
        "In nature, it is not only the physically weak but the mentally weak that get eaten.\n\
         Now we have created this modern society in which we have every comfort,\n\
         yet we are losing our ability to regulate our mood, our emotions.",
        WIM_HOF,
        &[INNER_STRENGTH],
    ),
    (
        "Cold is a stressor, so if you are able to get into the cold and control your body's response to it,\n\
         you will be able to control stress.",
        WIM_HOF,
        &[INNER_STRENGTH],
    ),
    (
        "Justifying conscription to promote the cause of liberty is one of the most bizarre notions ever conceived by man!\n\
         Forced servitude, with the risk of death and serious injury as a price to live free, makes no sense.",
        RON_PAUL,
        &[LIBERTY],
    ),
    (
        "When the federal government spends more each year than it collects in tax revenues,\n\
         it has three choices: It can raise taxes, print money, or borrow money.\n\
         While these actions may benefit politicians, all three options are bad for average Americans.",
        RON_PAUL,
        &[LIBERTY],
    ),
    (
        "Well, I don't think we should go to the moon.\n\
         I think we maybe should send some politicians up there.",
        RON_PAUL,
        &[POLITICS],
    ),
    (
        "I think a submarine is a very worthwhile weapon.\n\
         I believe we can defend ourselves with submarines and all our troops back at home.\n\
         This whole idea that we have to be in 130 countries and 900 bases...\n\
         is an old-fashioned idea.",
        RON_PAUL,
        &[LIBERTY],
    ),
    (
        "Of course I've already taken a very modest position on the monetary system,\n\
         I do take the position that we should just end the Fed.",
        RON_PAUL,
        &[LIBERTY, FINANCIAL_SYSTEM],
    ),
    (
        "Legitimate use of violence can only be that which is required in self-defense.",
        RON_PAUL,
        &[DEFENSE],
    ),
    (
        "I am absolutely opposed to a national ID card.\n\
         This is a total contradiction of what a free society is all about.\n\
         The purpose of government is to protect the secrecy and the privacy of all individuals,\n\
         not the secrecy of government. We don't need a national ID card.",
        RON_PAUL,
        &[LIBERTY],
    ),
    (
        "Maybe we ought to consider a Golden Rule in foreign policy:\n\
         Don't do to other nations what we don't want happening to us.\n\
         We endlessly bomb these countries and then we wonder why they get upset with us?",
        RON_PAUL,
        &[LIBERTY, PEACE],
    ),
    (
        "I am just absolutely convinced that the best formula for giving us peace and\n\
         preserving the American way of life is freedom, limited government,\n\
         and minding our own business overseas.",
        RON_PAUL,
        &[LIBERTY, PEACE],
    ),
];

/// Persist the seed authors, subjects and quotes; returns the quotes in
/// insertion order.
///
/// Nothing is written until the session flushes.
pub fn insert_quotes<C: Connection>(session: &mut Session<C>) -> Result<Vec<EntityRef<Quote>>> {
    let authors = [WIM_HOF, RON_PAUL]
        .into_iter()
        .map(|name| persist_new(session, Author::new(name)))
        .collect::<Result<Vec<_>>>()?;
    let subjects = [
        INNER_STRENGTH,
        LIBERTY,
        POLITICS,
        FINANCIAL_SYSTEM,
        DEFENSE,
        PEACE,
    ]
    .into_iter()
    .map(|subject| Ok((subject, persist_new(session, Subject::new(subject))?)))
    .collect::<Result<Vec<_>>>()?;

    let mut quotes = Vec::with_capacity(SEED_QUOTES.len());
    for (text, author_name, subject_names) in SEED_QUOTES {
        let author = if *author_name == WIM_HOF {
            &authors[0]
        } else {
            &authors[1]
        };
        let tagged = subjects
            .iter()
            .filter(|(name, _)| subject_names.contains(name))
            .map(|(_, subject)| subject);
        quotes.push(persist_new(session, Quote::new(*text, author, tagged))?);
    }
    tracing::debug!(quotes = quotes.len(), "Seed staged");
    Ok(quotes)
}

/// Upsert "David Icke" with the subjects "tyranny" and "truth" and persist
/// two quotes, flushing after the first.
pub async fn insert_extra_quotes<C: Connection>(
    session: &mut Session<C>,
    cx: &Cx,
) -> Outcome<Vec<EntityRef<Quote>>, Error> {
    let author = try_outcome!(upsert_author(session, cx, DAVID_ICKE).await);
    let tyranny = try_outcome!(upsert_subject(session, cx, "tyranny").await);
    let truth = try_outcome!(upsert_subject(session, cx, "truth").await);

    let first = try_result!(persist_new(
        session,
        Quote::new("Scarcity equals dependency equals control", &author, [&tyranny]),
    ));
    try_outcome!(session.flush(cx).await);
    let second = try_result!(persist_new(
        session,
        Quote::new(
            "Infinite love is the only truth. Everything else is illusion.",
            &author,
            [&truth],
        ),
    ));
    Outcome::Ok(vec![first, second])
}

fn persist_new<C: Connection, E: quotedb_core::Entity>(
    session: &mut Session<C>,
    entity: E,
) -> Result<EntityRef<E>> {
    let entity = entity.into_ref();
    session.persist(&entity)?;
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_shape() {
        assert_eq!(SEED_QUOTES.len(), 14);
        let by = |author: &str| SEED_QUOTES.iter().filter(|(_, a, _)| *a == author).count();
        assert_eq!(by(WIM_HOF), 5);
        assert_eq!(by(RON_PAUL), 9);
        let liberty = SEED_QUOTES
            .iter()
            .filter(|(_, _, subjects)| subjects.contains(&LIBERTY))
            .count();
        assert_eq!(liberty, 7);
        assert!(
            SEED_QUOTES
                .iter()
                .all(|(text, _, _)| text.chars().count() <= crate::entity::MAX_QUOTE_LENGTH as usize)
        );
        assert!(!SEED_QUOTES[2].0.contains("  "));
    }
}
