//! Modifiers: the objects that turn a field name into clause fragments.
//!
//! Every modifier implements [`Modifier::add`], which receives the field
//! name it was attached under and the target query. Variants are selected
//! when the modifier is built, never patched at runtime.

pub mod case;
pub mod errors;
pub mod field;
pub mod frame;
pub mod function;
pub mod predicate;
pub mod subquery;

use crate::query_model::{Query, Session};

pub use case::{Case, Range};
pub use errors::ExpressionError;
pub use field::{
    format_field, qualify_condition, Distinct, ExpressionField, Field, FieldFormat, FieldList,
    ForeignKey, GroupBy, NamedField, OrderBy, PrimaryKey, Table,
};
pub use frame::{FrameArg, RowBound, WindowFrame};
pub use function::{get_function, As, Arg, DatePart, Function, FunctionKind, SemanticType};
pub use predicate::{Between, Having, Not, Options, Value, Where, Wildcard};

/// Adds clause fragments to a query for one named field.
pub trait Modifier {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError>;
}

impl<M: Modifier + ?Sized> Modifier for Box<M> {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        (**self).add(name, query, session)
    }
}

impl<M: Modifier + ?Sized> Modifier for &M {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        (**self).add(name, query, session)
    }
}

/// Several modifiers on the same field, applied in order.
impl Modifier for Vec<Box<dyn Modifier>> {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        for modifier in self {
            modifier.add(name, query, session)?;
        }
        Ok(())
    }
}
