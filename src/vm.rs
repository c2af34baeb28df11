use crate::{
    builtins::BUILTINS,
    code::{self, Opcode},
    compiler::Bytecode,
    value::{Builtin, Closure, CompiledFunction, HashPair, Value},
};
use anyhow::{bail, Result};
use std::{collections::HashMap, rc::Rc};

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }
}

pub struct VirtualMachine {
    pub constants: Vec<Value>,
    pub stack: Vec<Value>,
    pub stack_pointer: usize,
    pub globals: Vec<Value>,
    pub frames: Vec<Frame>,
    pub frame_index: usize,
}

impl VirtualMachine {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals_store(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Lets a host keep one globals vector alive across several compiled
    /// programs, the way a REPL preserves bindings between submissions.
    pub fn new_with_globals_store(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        // The top-level program runs as an ordinary closure in the bottom
        // frame.
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            function: main_function,
            free: Vec::new(),
        });
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            stack_pointer: 0,
            globals,
            frames,
            frame_index: 1,
        }
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frame_index - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.frame_index - 1]
    }

    fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
        self.frame_index += 1;
    }

    fn pop_frame(&mut self) -> Frame {
        self.frame_index -= 1;
        self.frames.pop().expect("frame stack underflow")
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if self.stack_pointer >= STACK_SIZE {
            bail!("stack overflow");
        }
        self.stack[self.stack_pointer] = value;
        self.stack_pointer += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        if self.stack_pointer == 0 {
            bail!("stack underflow");
        }
        self.stack_pointer -= 1;
        Ok(self.stack[self.stack_pointer].clone())
    }

    pub fn stack_top(&self) -> Result<Value> {
        if self.stack_pointer == 0 {
            bail!("stack is empty");
        }
        Ok(self.stack[self.stack_pointer - 1].clone())
    }

    /// The value most recently popped off the stack; observable because Pop
    /// only moves the stack pointer.
    pub fn last_popped(&self) -> Value {
        self.stack[self.stack_pointer].clone()
    }

    pub fn run(&mut self) -> Result<()> {
        while self.frame_index > 0 {
            let closure = Rc::clone(&self.current_frame().closure);
            let instructions = &closure.function.instructions;
            let ip = self.current_frame().ip;
            if ip >= instructions.len() {
                break;
            }
            self.current_frame_mut().ip += 1;

            let Some(op) = Opcode::from_byte(instructions[ip]) else {
                bail!("opcode {} undefined", instructions[ip]);
            };
            match op {
                Opcode::Constant => {
                    let constant_index = code::read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let constant = self.constants[constant_index].clone();
                    self.push(constant)?;
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_operation(op)?;
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::True => {
                    self.push(Value::Boolean(true))?;
                }
                Opcode::False => {
                    self.push(Value::Boolean(false))?;
                }
                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                Opcode::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Value::Integer(value) => {
                            self.push(Value::Integer(value.wrapping_neg()))?;
                        }
                        operand => {
                            bail!("unsupported type for negation: {}", operand.type_name())
                        }
                    }
                }
                Opcode::Bang => {
                    let operand = self.pop()?;
                    let negated = match operand {
                        Value::Boolean(value) => !value,
                        Value::Null => true,
                        _ => false,
                    };
                    self.push(Value::Boolean(negated))?;
                }
                Opcode::JumpNotTruthy => {
                    let target = code::read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }
                Opcode::Jump => {
                    let target = code::read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip = target;
                }
                Opcode::Null => {
                    self.push(Value::Null)?;
                }
                Opcode::GetGlobal => {
                    let global_index = code::read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let value = self.globals[global_index].clone();
                    self.push(value)?;
                }
                Opcode::SetGlobal => {
                    let global_index = code::read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    self.globals[global_index] = self.pop()?;
                }
                Opcode::Array => {
                    let num_elements = code::read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let elements =
                        self.stack[self.stack_pointer - num_elements..self.stack_pointer].to_vec();
                    self.stack_pointer -= num_elements;
                    self.push(Value::Array(Rc::new(elements)))?;
                }
                Opcode::Hash => {
                    let num_elements = code::read_u16(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let hash =
                        self.build_hash(self.stack_pointer - num_elements, self.stack_pointer)?;
                    self.stack_pointer -= num_elements;
                    self.push(hash)?;
                }
                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                }
                Opcode::Call => {
                    let num_args = code::read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    self.execute_call(num_args)?;
                }
                Opcode::ReturnValue => {
                    let return_value = self.pop()?;
                    let frame = self.pop_frame();
                    // Dropping to below the base pointer discards the callee
                    // and its local region in one move.
                    self.stack_pointer = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                Opcode::Return => {
                    let frame = self.pop_frame();
                    self.stack_pointer = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }
                Opcode::SetLocal => {
                    let local_index = code::read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let base_pointer = self.current_frame().base_pointer;
                    self.stack[base_pointer + local_index] = self.pop()?;
                }
                Opcode::GetLocal => {
                    let local_index = code::read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + local_index].clone();
                    self.push(value)?;
                }
                Opcode::GetBuiltin => {
                    let builtin_index = code::read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    self.push(Value::Builtin(BUILTINS[builtin_index]))?;
                }
                Opcode::Closure => {
                    let constant_index = code::read_u16(&instructions[ip + 1..]) as usize;
                    let num_free = code::read_u8(&instructions[ip + 3..]) as usize;
                    self.current_frame_mut().ip += 3;
                    self.push_closure(constant_index, num_free)?;
                }
                Opcode::GetFree => {
                    let free_index = code::read_u8(&instructions[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;
                    let value = closure.free[free_index].clone();
                    self.push(value)?;
                }
            }
        }
        Ok(())
    }

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Value::Integer(left), Value::Integer(right)) => {
                self.execute_binary_integer_operation(op, *left, *right)
            }
            (Value::Str(left), Value::Str(right)) => {
                if op != Opcode::Add {
                    bail!("unknown string operator: {}", op as u8);
                }
                let combined = format!("{}{}", left, right);
                self.push(Value::Str(Rc::from(combined)))
            }
            _ => bail!(
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            ),
        }
    }

    fn execute_binary_integer_operation(
        &mut self,
        op: Opcode,
        left: i64,
        right: i64,
    ) -> Result<()> {
        let result = match op {
            Opcode::Add => left.wrapping_add(right),
            Opcode::Sub => left.wrapping_sub(right),
            Opcode::Mul => left.wrapping_mul(right),
            Opcode::Div => {
                if right == 0 {
                    bail!("division by zero");
                }
                left.wrapping_div(right)
            }
            op => bail!("unknown integer operator: {}", op as u8),
        };
        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        if let (Value::Integer(left), Value::Integer(right)) = (&left, &right) {
            let result = match op {
                Opcode::Equal => left == right,
                Opcode::NotEqual => left != right,
                Opcode::GreaterThan => left > right,
                op => bail!("unknown integer operator: {}", op as u8),
            };
            return self.push(Value::Boolean(result));
        }

        match op {
            Opcode::Equal => self.push(Value::Boolean(left.is_identical(&right))),
            Opcode::NotEqual => self.push(Value::Boolean(!left.is_identical(&right))),
            op => bail!(
                "unknown operator: {} ({} {})",
                op as u8,
                left.type_name(),
                right.type_name()
            ),
        }
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Value> {
        let mut pairs = HashMap::new();
        for index in (start..end).step_by(2) {
            let key = self.stack[index].clone();
            let value = self.stack[index + 1].clone();
            let Some(hash_key) = key.hash_key() else {
                bail!("unusable as hash key: {}", key.type_name());
            };
            pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> Result<()> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(index)) => {
                let max = elements.len() as i64 - 1;
                if *index < 0 || *index > max {
                    return self.push(Value::Null);
                }
                self.push(elements[*index as usize].clone())
            }
            (Value::Hash(pairs), index) => {
                let Some(key) = index.hash_key() else {
                    bail!("unusable as hash key: {}", index.type_name());
                };
                match pairs.get(&key) {
                    Some(pair) => self.push(pair.value.clone()),
                    None => self.push(Value::Null),
                }
            }
            _ => bail!("index operator not supported: {}", left.type_name()),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<()> {
        let callee = self.stack[self.stack_pointer - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => bail!("calling non-function"),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<()> {
        if num_args != closure.function.num_parameters {
            bail!(
                "wrong number of arguments: want={}, got={}",
                closure.function.num_parameters,
                num_args
            );
        }
        let num_locals = closure.function.num_locals;
        let base_pointer = self.stack_pointer - num_args;
        self.push_frame(Frame::new(closure, base_pointer));
        // Arguments already occupy the first local slots; the rest of the
        // local region is reserved by bumping the stack pointer.
        self.stack_pointer = base_pointer + num_locals;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: Builtin, num_args: usize) -> Result<()> {
        let args = self.stack[self.stack_pointer - num_args..self.stack_pointer].to_vec();
        let result = (builtin.function)(&args)?;
        self.stack_pointer = self.stack_pointer - num_args - 1;
        match result {
            Some(value) => self.push(value),
            None => self.push(Value::Null),
        }
    }

    fn push_closure(&mut self, constant_index: usize, num_free: usize) -> Result<()> {
        let constant = self.constants[constant_index].clone();
        let Value::Function(function) = constant else {
            bail!("not a function: {}", constant.type_name());
        };
        let free = self.stack[self.stack_pointer - num_free..self.stack_pointer].to_vec();
        self.stack_pointer -= num_free;
        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }
}
