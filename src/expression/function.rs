/// SQL function library.
///
/// Each function declares the semantic types it accepts and produces. A
/// nested function whose output does not fit the expected input is wrapped
/// in a CAST when it is attached. Dialect differences (substring, date
/// parts, current date, cast type names) are resolved at render time.
use std::collections::HashMap;
use std::fmt;

use crate::config::Dialect;
use crate::query_model::{ClauseKind, Query, Session};

use super::field::{format_field, FieldFormat};
use super::frame::WindowFrame;
use super::predicate::Value;
use super::{ExpressionError, Modifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Char,
    Int,
    Date,
    Float,
    Any,
}

impl SemanticType {
    /// Whether a value of type `given` can be used where `self` is expected.
    pub fn accepts(self, given: SemanticType) -> bool {
        self == SemanticType::Any
            || given == SemanticType::Any
            || self == given
            || (self == SemanticType::Float && given == SemanticType::Int)
    }

    fn type_name(self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (SemanticType::Char, Dialect::Oracle) => "VARCHAR2(255)",
            (SemanticType::Char, Dialect::MySql) => "CHAR",
            (SemanticType::Char, _) => "VARCHAR(255)",
            (SemanticType::Int, Dialect::MySql) => "SIGNED",
            (SemanticType::Int, Dialect::Oracle) => "NUMBER",
            (SemanticType::Int, _) => "INTEGER",
            (SemanticType::Float, Dialect::Oracle) => "NUMBER",
            (SemanticType::Float, Dialect::MySql) => "DECIMAL(18,4)",
            (SemanticType::Float, _) => "FLOAT",
            (SemanticType::Date, _) => "DATE",
            (SemanticType::Any, _) => "VARCHAR(255)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn keyword(&self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Avg,
    Min,
    Max,
    Sum,
    Count,
    SubString,
    Round,
    Lower,
    Upper,
    Length,
    Coalesce,
    Extract(DatePart),
    CurrentDate,
    Cast(SemanticType),
    RowNumber,
    Rank,
    Lag,
    Lead,
}

impl FunctionKind {
    /// Accepted input types; the first one is the anchor (field) slot.
    pub fn inputs(&self) -> &'static [SemanticType] {
        use SemanticType::*;
        match self {
            FunctionKind::Avg | FunctionKind::Sum => &[Float],
            FunctionKind::Min | FunctionKind::Max | FunctionKind::Count => &[Any],
            FunctionKind::SubString => &[Char, Int, Int],
            FunctionKind::Round => &[Float, Int],
            FunctionKind::Lower | FunctionKind::Upper | FunctionKind::Length => &[Char],
            FunctionKind::Coalesce => &[Any, Any],
            FunctionKind::Extract(_) => &[Date],
            FunctionKind::CurrentDate | FunctionKind::RowNumber | FunctionKind::Rank => &[],
            FunctionKind::Cast(_) => &[Any],
            FunctionKind::Lag | FunctionKind::Lead => &[Any, Int],
        }
    }

    pub fn output(&self) -> SemanticType {
        match self {
            FunctionKind::Avg | FunctionKind::Sum | FunctionKind::Round => SemanticType::Float,
            FunctionKind::Count
            | FunctionKind::Length
            | FunctionKind::Extract(_)
            | FunctionKind::RowNumber
            | FunctionKind::Rank => SemanticType::Int,
            FunctionKind::SubString | FunctionKind::Lower | FunctionKind::Upper => SemanticType::Char,
            FunctionKind::CurrentDate => SemanticType::Date,
            FunctionKind::Cast(target) => *target,
            FunctionKind::Min
            | FunctionKind::Max
            | FunctionKind::Coalesce
            | FunctionKind::Lag
            | FunctionKind::Lead => SemanticType::Any,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            FunctionKind::Avg
                | FunctionKind::Min
                | FunctionKind::Max
                | FunctionKind::Sum
                | FunctionKind::Count
        )
    }

    pub fn is_window(&self) -> bool {
        matches!(
            self,
            FunctionKind::RowNumber | FunctionKind::Rank | FunctionKind::Lag | FunctionKind::Lead
        )
    }

    /// Generic SQL spelling; dialect-specific forms are handled by `Function`.
    pub fn sql_name(&self) -> &'static str {
        match self {
            FunctionKind::Avg => "AVG",
            FunctionKind::Min => "MIN",
            FunctionKind::Max => "MAX",
            FunctionKind::Sum => "SUM",
            FunctionKind::Count => "COUNT",
            FunctionKind::SubString => "SUBSTRING",
            FunctionKind::Round => "ROUND",
            FunctionKind::Lower => "LOWER",
            FunctionKind::Upper => "UPPER",
            FunctionKind::Length => "LENGTH",
            FunctionKind::Coalesce => "COALESCE",
            FunctionKind::Extract(_) => "EXTRACT",
            FunctionKind::CurrentDate => "CURRENT_DATE",
            FunctionKind::Cast(_) => "CAST",
            FunctionKind::RowNumber => "ROW_NUMBER",
            FunctionKind::Rank => "RANK",
            FunctionKind::Lag => "LAG",
            FunctionKind::Lead => "LEAD",
        }
    }
}

/// Look up a function by name, case-insensitively.
pub fn get_function(name: &str) -> Option<FunctionKind> {
    let name_lower = name.trim().to_lowercase();
    FUNCTION_NAMES.get(name_lower.as_str()).copied()
}

// Static function name table
lazy_static::lazy_static! {
    static ref FUNCTION_NAMES: HashMap<&'static str, FunctionKind> = {
        let mut m = HashMap::new();

        // ===== AGGREGATES =====
        m.insert("avg", FunctionKind::Avg);
        m.insert("min", FunctionKind::Min);
        m.insert("max", FunctionKind::Max);
        m.insert("sum", FunctionKind::Sum);
        m.insert("count", FunctionKind::Count);

        // ===== STRING FUNCTIONS =====
        m.insert("substring", FunctionKind::SubString);
        m.insert("substr", FunctionKind::SubString);
        m.insert("lower", FunctionKind::Lower);
        m.insert("upper", FunctionKind::Upper);
        m.insert("length", FunctionKind::Length);
        m.insert("len", FunctionKind::Length);

        // ===== NUMERIC / GENERAL =====
        m.insert("round", FunctionKind::Round);
        m.insert("coalesce", FunctionKind::Coalesce);
        m.insert("cast", FunctionKind::Cast(SemanticType::Char));

        // ===== DATETIME FUNCTIONS =====
        m.insert("extract", FunctionKind::Extract(DatePart::Year));
        m.insert("year", FunctionKind::Extract(DatePart::Year));
        m.insert("month", FunctionKind::Extract(DatePart::Month));
        m.insert("day", FunctionKind::Extract(DatePart::Day));
        m.insert("current_date", FunctionKind::CurrentDate);
        m.insert("getdate", FunctionKind::CurrentDate);
        m.insert("sysdate", FunctionKind::CurrentDate);
        m.insert("curdate", FunctionKind::CurrentDate);

        // ===== WINDOW FUNCTIONS =====
        m.insert("row_number", FunctionKind::RowNumber);
        m.insert("rownumber", FunctionKind::RowNumber);
        m.insert("rank", FunctionKind::Rank);
        m.insert("lag", FunctionKind::Lag);
        m.insert("lead", FunctionKind::Lead);

        m
    };
}

/// A function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Column name, qualified with the query alias when rendered
    Field(String),
    Value(Value),
    Function(Box<Function>),
    /// Copied verbatim
    Raw(String),
}

impl Arg {
    fn semantic_type(&self) -> SemanticType {
        match self {
            Arg::Value(Value::Text(_)) => SemanticType::Char,
            Arg::Value(Value::Int(_)) => SemanticType::Int,
            Arg::Value(Value::Float(_)) => SemanticType::Float,
            Arg::Function(function) => function.kind.output(),
            _ => SemanticType::Any,
        }
    }

    fn render(&self, query: &Query, session: &Session) -> String {
        match self {
            Arg::Field(name) => format_field(name, query),
            Arg::Value(value) => value.quoted(),
            Arg::Function(function) => function.render(query, session),
            Arg::Raw(text) => text.clone(),
        }
    }
}

impl From<Function> for Arg {
    fn from(function: Function) -> Self {
        Arg::Function(Box::new(function))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Value(Value::Int(value))
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Value(Value::Int(value.into()))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Value(Value::Float(value))
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Value(Value::Text(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    kind: FunctionKind,
    /// First input: the field the function is attached to, or a nested function
    anchor: Option<Arg>,
    /// Remaining inputs in declaration order
    params: Vec<Arg>,
    over: Option<WindowFrame>,
}

impl Function {
    pub fn new(kind: FunctionKind) -> Self {
        Self {
            kind,
            anchor: None,
            params: Vec::new(),
            over: None,
        }
    }

    /// Build from a registered name (`sum`, `substr`, `row_number`, ...).
    pub fn from_name(name: &str) -> Result<Self, ExpressionError> {
        get_function(name)
            .map(Self::new)
            .ok_or_else(|| ExpressionError::UnknownFunction(name.trim().to_string()))
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Use `inner` as the first input, casting it when its output type does
    /// not fit.
    pub fn of(mut self, inner: Function) -> Self {
        let expected = self.expected_type(0);
        self.anchor = Some(Self::fit(inner, expected));
        self
    }

    /// Append a trailing argument (substring bounds, precision, default...).
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        let arg = arg.into();
        let expected = self.expected_type(self.params.len() + 1);
        let arg = match arg {
            Arg::Function(inner) => Self::fit(*inner, expected),
            other => other,
        };
        self.params.push(arg);
        self
    }

    pub fn over(mut self, frame: WindowFrame) -> Self {
        self.over = Some(frame);
        self
    }

    /// Name the result: `expr as alias`.
    pub fn named(self, alias: &str) -> As {
        As::new(self, alias)
    }

    fn expected_type(&self, position: usize) -> SemanticType {
        let inputs = self.kind.inputs();
        inputs
            .get(position)
            .or(inputs.last())
            .copied()
            .unwrap_or(SemanticType::Any)
    }

    fn fit(inner: Function, expected: SemanticType) -> Arg {
        let given = inner.kind.output();
        if expected.accepts(given) {
            Arg::Function(Box::new(inner))
        } else {
            log::trace!("casting {:?} output {:?} to {:?}", inner.kind, given, expected);
            Arg::Function(Box::new(Function::new(FunctionKind::Cast(expected)).of(inner)))
        }
    }

    /// Whether the innermost function still lacks its anchor field.
    pub fn needs_anchor(&self) -> bool {
        match &self.anchor {
            None => !self.kind.inputs().is_empty(),
            Some(Arg::Function(inner)) => inner.needs_anchor(),
            Some(_) => false,
        }
    }

    /// Give the field `name` to the innermost function lacking an input.
    pub fn attach(&mut self, name: &str) {
        if self.anchor.is_none() {
            if !self.kind.inputs().is_empty() {
                self.anchor = Some(Arg::Field(name.trim().to_string()));
            }
            return;
        }
        if let Some(Arg::Function(inner)) = &mut self.anchor {
            inner.attach(name);
        }
    }

    pub fn render(&self, query: &Query, session: &Session) -> String {
        let dialect = session.dialect();
        let anchor = match &self.anchor {
            Some(arg) => arg.render(query, session),
            None if self.kind == FunctionKind::Count => "*".to_string(),
            None => String::new(),
        };
        let params: Vec<String> = self.params.iter().map(|p| p.render(query, session)).collect();
        let all_args = || {
            std::iter::once(anchor.clone())
                .filter(|a| !a.is_empty())
                .chain(params.iter().cloned())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let text = match self.kind {
            FunctionKind::SubString => match dialect {
                Dialect::Oracle => format!("SUBSTR({})", all_args()),
                Dialect::Postgres => {
                    let mut text = format!("SUBSTRING({}", anchor);
                    if let Some(start) = params.first() {
                        text.push_str(&format!(" FROM {}", start));
                    }
                    if let Some(length) = params.get(1) {
                        text.push_str(&format!(" FOR {}", length));
                    }
                    text.push(')');
                    text
                }
                _ => format!("SUBSTRING({})", all_args()),
            },
            FunctionKind::Extract(part) => match dialect {
                Dialect::SqlServer => format!("DATEPART({}, {})", part.keyword(), anchor),
                Dialect::MySql => format!("{}({})", part.keyword(), anchor),
                _ => format!("EXTRACT({} FROM {})", part.keyword(), anchor),
            },
            FunctionKind::CurrentDate => match dialect {
                Dialect::SqlServer => "GETDATE()".to_string(),
                Dialect::Oracle => "SYSDATE".to_string(),
                Dialect::MySql => "CURDATE()".to_string(),
                Dialect::Ansi | Dialect::Postgres => "CURRENT_DATE".to_string(),
            },
            FunctionKind::Cast(target) => {
                format!("CAST({} AS {})", anchor, target.type_name(dialect))
            }
            FunctionKind::Length if dialect == Dialect::SqlServer => format!("LEN({})", anchor),
            kind => format!("{}({})", kind.sql_name(), all_args()),
        };

        match &self.over {
            Some(frame) => format!("{} {}", text, frame.render(query)),
            None => text,
        }
    }
}

impl FieldFormat for Function {
    fn format(&self, name: &str, query: &Query, session: &Session) -> String {
        let mut function = self.clone();
        function.attach(name);
        function.render(query, session)
    }
}

impl Modifier for Function {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let field = self.format(name, query, session);
        query.push(ClauseKind::Select, field);
        Ok(())
    }
}

/// A function result with an output name; `also` modifiers receive the
/// alias (for example GROUP BY or ORDER BY on it).
pub struct As {
    function: Function,
    alias: String,
    also: Vec<Box<dyn Modifier>>,
}

impl As {
    pub fn new(function: Function, alias: &str) -> Self {
        Self {
            function,
            alias: alias.trim().to_string(),
            also: Vec::new(),
        }
    }

    pub fn also(mut self, modifier: impl Modifier + 'static) -> Self {
        self.also.push(Box::new(modifier));
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl fmt::Debug for As {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("As")
            .field("function", &self.function)
            .field("alias", &self.alias)
            .field("also", &self.also.len())
            .finish()
    }
}

impl Modifier for As {
    fn add(&self, name: &str, query: &mut Query, session: &Session) -> Result<(), ExpressionError> {
        let field = format!(
            "{} as {}",
            self.function.format(name, query, session),
            self.alias
        );
        query.push(ClauseKind::Select, field);
        for modifier in &self.also {
            modifier.add(&self.alias, query, session)?;
        }
        Ok(())
    }
}
