mod guesses;
mod slots;
