//! A `Query` used as a modifier of another query.

use crate::generator::sql;
use crate::query_model::{ClauseKind, Query, QueryRole, Session};

use super::field::format_field;
use super::{ExpressionError, Modifier};

impl Modifier for Query {
    /// `Plain` joins this query on `main.name = self.key`; `SelectIn` and
    /// `NotSelectIn` add `main.name [NOT] IN (SELECT ...)`.
    fn add(&self, name: &str, main: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let operator = match self.role() {
            QueryRole::Plain => {
                self.join_into(main, name.trim())?;
                return Ok(());
            }
            QueryRole::SelectIn => "IN",
            QueryRole::NotSelectIn => "NOT IN",
        };
        let condition = format!(
            "{} {} ({})",
            format_field(name, main),
            operator,
            sql::render(self, session, true)
        );
        main.push(ClauseKind::Where, condition);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Field, NamedField, PrimaryKey};
    use crate::query_model::QueryModelError;

    #[test]
    fn test_plain_query_is_joined() {
        let session = Session::default();
        let actor = Query::new("Actor a", &session)
            .with("name", NamedField::new("actors_name"), &session)
            .unwrap()
            .with("id", PrimaryKey, &session)
            .unwrap();
        let cast = Query::new("Cast c", &session)
            .with("role", Field, &session)
            .unwrap()
            .with("actor_id", actor, &session)
            .unwrap();
        assert_eq!(
            cast.values(ClauseKind::From),
            ["Cast c", "JOIN Actor a ON (c.actor_id = a.id)"]
        );
        assert_eq!(
            cast.values(ClauseKind::Select),
            ["c.role", "a.name as actors_name"]
        );
    }

    #[test]
    fn test_plain_query_without_key_fails() {
        let session = Session::default();
        let actor = Query::new("Actor a", &session);
        let result = Query::new("Cast c", &session).with("actor_id", actor, &session);
        assert_eq!(
            result.err(),
            Some(ExpressionError::QueryModel(QueryModelError::MissingPrimaryKey(
                "Actor".to_string()
            )))
        );
    }

    #[test]
    fn test_select_in_roles() {
        let session = Session::default();
        let mut review = Query::new("Review r", &session);
        review.push(ClauseKind::Select, "r.movie_id");
        review.push(ClauseKind::Where, "r.rate > 4.5");
        review.set_role(QueryRole::SelectIn);

        let mut genres = Query::new("Genres g", &session);
        genres.push(ClauseKind::Select, "g.movie_id");
        genres.push(ClauseKind::Where, "g.name = 'Horror'");
        genres.set_role(QueryRole::NotSelectIn);

        let movie = Query::new("Movie m", &session)
            .with("id", review, &session)
            .unwrap()
            .with("id", genres, &session)
            .unwrap();
        assert_eq!(
            movie.values(ClauseKind::Where),
            [
                "m.id IN (SELECT r.movie_id FROM Review r WHERE r.rate > 4.5)",
                "m.id NOT IN (SELECT g.movie_id FROM Genres g WHERE g.name = 'Horror')"
            ]
        );
    }
}
