// Expression evaluation in a suspended frame
//
// Evaluates the parsed Java subset against target values. Every failure is
// an `InvalidExpression`; method invocation is rejected.

use crate::error::{DebuggerError, Result};
use crate::parser::{self, BinaryOp, Expr, Literal, UnaryOp};
use crate::registry::class_signature;
use crate::session::{thread_error, DebuggerSession, SessionInner};
use crate::target::TargetVm;
use jdwp_client::protocol::error_codes;
use jdwp_client::stackframe::VariableSlot;
use jdwp_client::types::{
    ref_type_tags, signature_tag, FrameId, Location, ObjectId, ThreadId, TypeTag, Value, ValueData,
};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

fn invalid(message: impl Into<String>) -> DebuggerError {
    DebuggerError::invalid_expression(message)
}

/// Numeric value after binary numeric promotion
#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        Some(match value.data {
            ValueData::Byte(v) => Num::Int(v.into()),
            ValueData::Short(v) => Num::Int(v.into()),
            ValueData::Char(v) => Num::Int(v.into()),
            ValueData::Int(v) => Num::Int(v),
            ValueData::Long(v) => Num::Long(v),
            ValueData::Float(v) => Num::Float(v),
            ValueData::Double(v) => Num::Double(v),
            _ => return None,
        })
    }

    fn rank(self) -> u8 {
        match self {
            Num::Int(_) => 0,
            Num::Long(_) => 1,
            Num::Float(_) => 2,
            Num::Double(_) => 3,
        }
    }

    fn to_rank(self, rank: u8) -> Num {
        match (self, rank) {
            (Num::Int(v), 1) => Num::Long(v.into()),
            (Num::Int(v), 2) => Num::Float(v as f32),
            (Num::Int(v), 3) => Num::Double(v.into()),
            (Num::Long(v), 2) => Num::Float(v as f32),
            (Num::Long(v), 3) => Num::Double(v as f64),
            (Num::Float(v), 3) => Num::Double(v.into()),
            (same, _) => same,
        }
    }

    fn promote(a: Num, b: Num) -> (Num, Num) {
        let rank = a.rank().max(b.rank());
        (a.to_rank(rank), b.to_rank(rank))
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(v) => v.into(),
            Num::Long(v) => v as f64,
            Num::Float(v) => v.into(),
            Num::Double(v) => v,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(v) => Value::int(v),
            Num::Long(v) => Value::long(v),
            Num::Float(v) => Value::float(v),
            Num::Double(v) => Value::double(v),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value.data {
        ValueData::Byte(_) => "byte",
        ValueData::Char(_) => "char",
        ValueData::Float(_) => "float",
        ValueData::Double(_) => "double",
        ValueData::Int(_) => "int",
        ValueData::Long(_) => "long",
        ValueData::Short(_) => "short",
        ValueData::Boolean(_) => "boolean",
        ValueData::Object(_) => "reference",
        ValueData::Void => "void",
    }
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value> {
    let mismatch = || invalid(format!("bad operand type {} for unary {:?}", type_name(value), op));
    match op {
        UnaryOp::Not => match value.data {
            ValueData::Boolean(b) => Ok(Value::boolean(!b)),
            _ => Err(mismatch()),
        },
        UnaryOp::Plus => Num::of(value).map(Num::into_value).ok_or_else(mismatch),
        UnaryOp::Neg => match Num::of(value).ok_or_else(mismatch)? {
            Num::Int(v) => Ok(Value::int(v.wrapping_neg())),
            Num::Long(v) => Ok(Value::long(v.wrapping_neg())),
            Num::Float(v) => Ok(Value::float(-v)),
            Num::Double(v) => Ok(Value::double(-v)),
        },
        UnaryOp::BitNot => match Num::of(value).ok_or_else(mismatch)? {
            Num::Int(v) => Ok(Value::int(!v)),
            Num::Long(v) => Ok(Value::long(!v)),
            _ => Err(mismatch()),
        },
    }
}

fn arithmetic(op: BinaryOp, left: Num, right: Num) -> Result<Value> {
    let (left, right) = Num::promote(left, right);
    let value = match (left, right) {
        (Num::Int(a), Num::Int(b)) => Num::Int(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(invalid("division by zero")),
            BinaryOp::Div => a.wrapping_div(b),
            BinaryOp::Rem => a.wrapping_rem(b),
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            BinaryOp::BitXor => a ^ b,
            _ => return Err(invalid(format!("bad operands for {:?}", op))),
        }),
        (Num::Long(a), Num::Long(b)) => Num::Long(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(invalid("division by zero")),
            BinaryOp::Div => a.wrapping_div(b),
            BinaryOp::Rem => a.wrapping_rem(b),
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            BinaryOp::BitXor => a ^ b,
            _ => return Err(invalid(format!("bad operands for {:?}", op))),
        }),
        (Num::Float(a), Num::Float(b)) => Num::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            _ => return Err(invalid(format!("bad operand type float for {:?}", op))),
        }),
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            Num::Double(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => return Err(invalid(format!("bad operand type double for {:?}", op))),
            })
        }
    };
    Ok(value.into_value())
}

fn shift(op: BinaryOp, left: Num, right: Num) -> Result<Value> {
    let distance = match right {
        Num::Int(v) => i64::from(v),
        Num::Long(v) => v,
        _ => return Err(invalid("shift distance must be integral")),
    };
    match left {
        Num::Int(v) => {
            let d = (distance & 31) as u32;
            Ok(Value::int(match op {
                BinaryOp::Shl => v.wrapping_shl(d),
                BinaryOp::Shr => v.wrapping_shr(d),
                _ => ((v as u32) >> d) as i32,
            }))
        }
        Num::Long(v) => {
            let d = (distance & 63) as u32;
            Ok(Value::long(match op {
                BinaryOp::Shl => v.wrapping_shl(d),
                BinaryOp::Shr => v.wrapping_shr(d),
                _ => ((v as u64) >> d) as i64,
            }))
        }
        _ => Err(invalid("shifted value must be integral")),
    }
}

fn compare(op: BinaryOp, left: Num, right: Num) -> bool {
    let (left, right) = Num::promote(left, right);
    let ordering = match (left, right) {
        (Num::Int(a), Num::Int(b)) => a.partial_cmp(&b),
        (Num::Long(a), Num::Long(b)) => a.partial_cmp(&b),
        (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
    };
    // NaN compares false except for !=
    let Some(ordering) = ordering else {
        return op == BinaryOp::Ne;
    };
    match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Ge => ordering.is_ge(),
        BinaryOp::Eq => ordering.is_eq(),
        _ => ordering.is_ne(),
    }
}

fn java_string(value: &Value) -> String {
    match value.data {
        ValueData::Byte(v) => v.to_string(),
        ValueData::Short(v) => v.to_string(),
        ValueData::Int(v) => v.to_string(),
        ValueData::Long(v) => v.to_string(),
        ValueData::Float(v) => format!("{:?}", v),
        ValueData::Double(v) => format!("{:?}", v),
        ValueData::Char(v) => char::from_u32(v.into()).unwrap_or('?').to_string(),
        ValueData::Boolean(v) => v.to_string(),
        ValueData::Object(0) => "null".to_string(),
        ValueData::Object(id) => format!("@{:x}", id),
        ValueData::Void => String::new(),
    }
}

struct Evaluator<'a, T: TargetVm> {
    inner: &'a SessionInner<T>,
    thread: ThreadId,
    frame: FrameId,
    location: Location,
}

impl<T: TargetVm> Evaluator<'_, T> {
    fn eval<'b>(&'b self, expr: &'b Expr) -> EvalFuture<'b> {
        Box::pin(async move {
            match expr {
                Expr::Literal(literal) => self.literal(literal).await,
                Expr::This => self.this().await,
                Expr::Name(name) => self.name(name).await,
                Expr::Field(base, name) => self.field(base, name).await,
                Expr::Index(array, index) => {
                    let array = self.eval(array).await?;
                    let index = self.eval(index).await?;
                    self.index(&array, &index).await
                }
                Expr::Call(_, method, _) => Err(invalid(format!(
                    "method invocation is not supported: {}()",
                    method
                ))),
                Expr::Unary(op, operand) => unary(*op, &self.eval(operand).await?),
                Expr::Binary(BinaryOp::And, left, right) => {
                    let value = self.boolean(left).await? && self.boolean(right).await?;
                    Ok(Value::boolean(value))
                }
                Expr::Binary(BinaryOp::Or, left, right) => {
                    let value = self.boolean(left).await? || self.boolean(right).await?;
                    Ok(Value::boolean(value))
                }
                Expr::Binary(op, left, right) => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    self.binary(*op, &left, &right).await
                }
                Expr::Conditional(condition, then, otherwise) => {
                    if self.boolean(condition).await? {
                        self.eval(then).await
                    } else {
                        self.eval(otherwise).await
                    }
                }
            }
        })
    }

    async fn boolean(&self, expr: &Expr) -> Result<bool> {
        match self.eval(expr).await?.data {
            ValueData::Boolean(b) => Ok(b),
            _ => Err(invalid("expected a boolean operand")),
        }
    }

    async fn literal(&self, literal: &Literal) -> Result<Value> {
        Ok(match literal {
            Literal::Int(v) => Value::int(*v),
            Literal::Long(v) => Value::long(*v),
            Literal::Float(v) => Value::float(*v),
            Literal::Double(v) => Value::double(*v),
            Literal::Char(v) => Value::char(*v),
            Literal::Bool(v) => Value::boolean(*v),
            Literal::Null => Value::null(),
            Literal::Str(s) => self.new_string(s).await?,
        })
    }

    async fn new_string(&self, text: &str) -> Result<Value> {
        let id = self.inner.target.create_string(text).await?;
        Ok(Value::object(TypeTag::String as u8, id))
    }

    async fn this_id(&self) -> Result<Option<ObjectId>> {
        self.inner
            .target
            .this_object(self.thread, self.frame)
            .await
            .map_err(|e| thread_error(e, self.thread))
    }

    async fn this(&self) -> Result<Value> {
        match self.this_id().await? {
            Some(id) if id != 0 => Ok(Value::object(TypeTag::Object as u8, id)),
            _ => Err(invalid("'this' is not available in a static context")),
        }
    }

    async fn local(&self, name: &str) -> Result<Option<Value>> {
        let variables = match self
            .inner
            .target
            .variable_table(self.location.class_id, self.location.method_id)
            .await
        {
            Ok(variables) => variables,
            Err(e) if e.error_code() == Some(error_codes::ABSENT_INFORMATION) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(variable) = variables
            .iter()
            .find(|v| v.name == name && v.is_live_at(self.location.index))
        else {
            return Ok(None);
        };
        let slot = VariableSlot {
            slot: variable.slot as i32,
            sig_byte: signature_tag(&variable.signature),
        };
        let mut values = self
            .inner
            .target
            .frame_values(self.thread, self.frame, &[slot])
            .await
            .map_err(|e| thread_error(e, self.thread))?;
        Ok(values.pop())
    }

    /// Field of an object, or static field when `object` is 0
    async fn read_field(
        &self,
        ref_type: u64,
        object: ObjectId,
        name: &str,
        statics_only: bool,
    ) -> Result<Option<Value>> {
        let Some((declaring, field)) = self.inner.find_field(ref_type, name).await? else {
            return Ok(None);
        };
        if field.is_static() {
            let mut values = self
                .inner
                .target
                .static_values(declaring, &[field.field_id])
                .await?;
            return Ok(values.pop());
        }
        if statics_only || object == 0 {
            return Ok(None);
        }
        let mut values = self
            .inner
            .target
            .object_values(object, &[field.field_id])
            .await?;
        Ok(values.pop())
    }

    async fn name(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.local(name).await? {
            return Ok(value);
        }
        if let Some(this) = self.this_id().await?.filter(|id| *id != 0) {
            let (_, ref_type) = self.inner.target.object_reference_type(this).await?;
            if let Some(value) = self.read_field(ref_type, this, name, false).await? {
                return Ok(value);
            }
        }
        if let Some(value) = self
            .read_field(self.location.class_id, 0, name, true)
            .await?
        {
            return Ok(value);
        }
        Err(invalid(format!("unknown name '{}'", name)))
    }

    async fn field(&self, base: &Expr, name: &str) -> Result<Value> {
        let object = match self.eval(base).await {
            Ok(value) => value,
            Err(DebuggerError::InvalidExpression(message)) => {
                // `pkg.Class.field` names a static field
                if let Some(class_name) = base.qualified_name() {
                    if let Some(value) = self.static_field(&class_name, name).await? {
                        return Ok(value);
                    }
                }
                return Err(DebuggerError::InvalidExpression(message));
            }
            Err(e) => return Err(e),
        };
        let id = match object.data {
            ValueData::Object(0) => return Err(invalid(format!("null dereference reading '{}'", name))),
            ValueData::Object(id) => id,
            _ => {
                return Err(invalid(format!(
                    "{} has no field '{}'",
                    type_name(&object),
                    name
                )))
            }
        };
        let (tag, ref_type) = self.inner.target.object_reference_type(id).await?;
        if tag == ref_type_tags::ARRAY {
            return match name {
                "length" => Ok(Value::int(self.inner.target.array_length(id).await?)),
                _ => Err(invalid(format!("arrays have no field '{}'", name))),
            };
        }
        self.read_field(ref_type, id, name, false)
            .await?
            .ok_or_else(|| invalid(format!("unknown field '{}'", name)))
    }

    async fn static_field(&self, class_name: &str, name: &str) -> Result<Option<Value>> {
        let classes = self
            .inner
            .target
            .classes_by_signature(&class_signature(class_name))
            .await?;
        let Some(class) = classes.first() else {
            return Ok(None);
        };
        self.read_field(class.type_id, 0, name, true).await
    }

    async fn index(&self, array: &Value, index: &Value) -> Result<Value> {
        let id = match array.data {
            ValueData::Object(0) => return Err(invalid("null dereference indexing an array")),
            ValueData::Object(id) => id,
            _ => return Err(invalid("indexed value is not an array")),
        };
        let (tag, _) = self.inner.target.object_reference_type(id).await?;
        if tag != ref_type_tags::ARRAY {
            return Err(invalid("indexed value is not an array"));
        }
        let position = match Num::of(index) {
            Some(Num::Int(i)) => i,
            _ => return Err(invalid("array index must be an int")),
        };
        let length = self.inner.target.array_length(id).await?;
        if position < 0 || position >= length {
            return Err(invalid(format!(
                "index {} out of bounds for length {}",
                position, length
            )));
        }
        let mut values = self.inner.target.array_values(id, position, 1).await?;
        values
            .pop()
            .ok_or_else(|| invalid(format!("no element at index {}", position)))
    }

    /// Contents when the value is a java.lang.String
    async fn string_contents(&self, value: &Value) -> Result<Option<String>> {
        let id = match value.data {
            ValueData::Object(0) => return Ok(None),
            ValueData::Object(id) => id,
            _ => return Ok(None),
        };
        if value.tag != TypeTag::String as u8 {
            let (_, ref_type) = self.inner.target.object_reference_type(id).await?;
            if self.inner.class_name(ref_type).await? != "java.lang.String" {
                return Ok(None);
            }
        }
        Ok(Some(self.inner.target.string_value(id).await?))
    }

    async fn display(&self, value: &Value) -> Result<String> {
        Ok(match self.string_contents(value).await? {
            Some(text) => text,
            None => java_string(value),
        })
    }

    async fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
        if op == BinaryOp::Add {
            let left_text = self.string_contents(left).await?;
            let right_text = self.string_contents(right).await?;
            if left_text.is_some() || right_text.is_some() {
                let left_text = match left_text {
                    Some(text) => text,
                    None => self.display(left).await?,
                };
                let right_text = match right_text {
                    Some(text) => text,
                    None => self.display(right).await?,
                };
                return self.new_string(&format!("{}{}", left_text, right_text)).await;
            }
        }

        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                let equal = self.equals(left, right).await?;
                Ok(Value::boolean(equal == (op == BinaryOp::Eq)))
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                if let (ValueData::Boolean(a), ValueData::Boolean(b)) = (&left.data, &right.data) {
                    let value = match op {
                        BinaryOp::BitAnd => a & b,
                        BinaryOp::BitOr => a | b,
                        _ => a ^ b,
                    };
                    return Ok(Value::boolean(value));
                }
                let (a, b) = self.numbers(op, left, right)?;
                arithmetic(op, a, b)
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => {
                let (a, b) = self.numbers(op, left, right)?;
                shift(op, a, b)
            }
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let (a, b) = self.numbers(op, left, right)?;
                Ok(Value::boolean(compare(op, a, b)))
            }
            _ => {
                let (a, b) = self.numbers(op, left, right)?;
                arithmetic(op, a, b)
            }
        }
    }

    fn numbers(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<(Num, Num)> {
        match (Num::of(left), Num::of(right)) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(invalid(format!(
                "bad operand types {} and {} for {:?}",
                type_name(left),
                type_name(right),
                op
            ))),
        }
    }

    async fn equals(&self, left: &Value, right: &Value) -> Result<bool> {
        if let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) {
            return Ok(compare(BinaryOp::Eq, a, b));
        }
        match (&left.data, &right.data) {
            (ValueData::Boolean(a), ValueData::Boolean(b)) => Ok(a == b),
            (ValueData::Object(a), ValueData::Object(b)) => {
                if a == b {
                    return Ok(true);
                }
                // Strings compare by contents
                match (
                    self.string_contents(left).await?,
                    self.string_contents(right).await?,
                ) {
                    (Some(a), Some(b)) => Ok(a == b),
                    _ => Ok(false),
                }
            }
            _ => Err(invalid(format!(
                "incomparable types {} and {}",
                type_name(left),
                type_name(right)
            ))),
        }
    }
}

impl<T: TargetVm> SessionInner<T> {
    /// Evaluate in frame `depth` (0 is innermost) of a suspended thread
    pub(crate) async fn evaluate_in_frame(
        &self,
        thread: ThreadId,
        depth: usize,
        expression: &str,
    ) -> Result<Value> {
        let expr = parser::parse(expression)?;
        let start = i32::try_from(depth).map_err(|_| invalid("frame depth out of range"))?;
        let frames = self
            .target
            .frames(thread, start, 1)
            .await
            .map_err(|e| thread_error(e, thread))?;
        let Some(frame) = frames.first() else {
            return Err(DebuggerError::InvalidState(format!(
                "thread {:#x} has no frame {}",
                thread, depth
            )));
        };
        let evaluator = Evaluator {
            inner: self,
            thread,
            frame: frame.frame_id,
            location: frame.location,
        };
        let value = evaluator.eval(&expr).await?;
        debug!("{} => {}", expression, value.format());
        Ok(value)
    }

    pub(crate) async fn evaluate_condition(&self, thread: ThreadId, condition: &str) -> Result<bool> {
        match self.evaluate_in_frame(thread, 0, condition).await?.data {
            ValueData::Boolean(b) => Ok(b),
            _ => Err(invalid(format!("condition '{}' is not boolean", condition))),
        }
    }

    /// Java-style text of a value; strings show their contents
    pub(crate) async fn display_value(&self, thread: ThreadId, value: &Value) -> Result<String> {
        let frames = self
            .target
            .frames(thread, 0, 1)
            .await
            .map_err(|e| thread_error(e, thread))?;
        match frames.first() {
            Some(frame) => {
                let evaluator = Evaluator {
                    inner: self,
                    thread,
                    frame: frame.frame_id,
                    location: frame.location,
                };
                evaluator.display(value).await
            }
            None => Ok(java_string(value)),
        }
    }
}

impl<T: TargetVm> DebuggerSession<T> {
    /// Evaluate an expression in the top frame of the current thread
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.inner.ensure_connected()?;
        let thread = self
            .inner
            .current_thread()
            .ok_or_else(|| DebuggerError::InvalidState("no current thread".into()))?;
        self.inner.evaluate_in_frame(thread, 0, expression).await
    }

    pub async fn evaluate_in(&self, thread: ThreadId, depth: usize, expression: &str) -> Result<Value> {
        self.inner.ensure_connected()?;
        self.inner.evaluate_in_frame(thread, depth, expression).await
    }

    /// Text of a value as Java would print it, reading strings from the target
    pub async fn display_value(&self, thread: ThreadId, value: &Value) -> Result<String> {
        self.inner.display_value(thread, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion() {
        assert_eq!(
            Num::promote(Num::Int(2), Num::Long(3)),
            (Num::Long(2), Num::Long(3))
        );
        assert_eq!(
            Num::promote(Num::Float(1.5), Num::Long(3)),
            (Num::Float(1.5), Num::Float(3.0))
        );
    }

    #[test]
    fn test_integer_arithmetic_wraps_and_rejects_zero_divisor() {
        assert_eq!(
            arithmetic(BinaryOp::Add, Num::Int(i32::MAX), Num::Int(1)).unwrap(),
            Value::int(i32::MIN)
        );
        assert_eq!(arithmetic(BinaryOp::Div, Num::Int(7), Num::Int(2)).unwrap(), Value::int(3));
        assert_eq!(arithmetic(BinaryOp::Rem, Num::Int(-7), Num::Int(2)).unwrap(), Value::int(-1));
        assert!(matches!(
            arithmetic(BinaryOp::Div, Num::Long(1), Num::Int(0)),
            Err(DebuggerError::InvalidExpression(_))
        ));
        // Floating division by zero is defined
        assert_eq!(
            arithmetic(BinaryOp::Div, Num::Double(1.0), Num::Int(0)).unwrap(),
            Value::double(f64::INFINITY)
        );
    }

    #[test]
    fn test_shifts_mask_distance() {
        assert_eq!(shift(BinaryOp::Shl, Num::Int(1), Num::Int(33)).unwrap(), Value::int(2));
        assert_eq!(shift(BinaryOp::UShr, Num::Int(-1), Num::Int(28)).unwrap(), Value::int(15));
        assert_eq!(shift(BinaryOp::Shr, Num::Long(-16), Num::Int(2)).unwrap(), Value::long(-4));
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(BinaryOp::Lt, Num::Int(1), Num::Double(1.5)));
        assert!(compare(BinaryOp::Eq, Num::Int(3), Num::Long(3)));
        assert!(!compare(BinaryOp::Eq, Num::Double(f64::NAN), Num::Double(f64::NAN)));
        assert!(compare(BinaryOp::Ne, Num::Double(f64::NAN), Num::Double(f64::NAN)));
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Neg, &Value::char(65)).unwrap(), Value::int(-65));
        assert_eq!(unary(UnaryOp::BitNot, &Value::int(0)).unwrap(), Value::int(-1));
        assert_eq!(unary(UnaryOp::Not, &Value::boolean(true)).unwrap(), Value::boolean(false));
        assert!(unary(UnaryOp::Not, &Value::int(1)).is_err());
    }

    #[test]
    fn test_java_string() {
        assert_eq!(java_string(&Value::double(2.0)), "2.0");
        assert_eq!(java_string(&Value::char(b'x' as u16)), "x");
        assert_eq!(java_string(&Value::null()), "null");
    }
}
