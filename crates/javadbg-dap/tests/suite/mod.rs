mod evaluate;
mod exception_info;
mod execution;
mod lifecycle;
mod protocol;
mod set_variable;
mod stack_trace;
