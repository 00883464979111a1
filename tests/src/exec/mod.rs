mod interpreter;
