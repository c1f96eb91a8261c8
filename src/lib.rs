// Wardrobe - virtual try-on generation from a person photo and a clothing photo

pub mod tryon;
